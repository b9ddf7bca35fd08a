//! Session controller: lifecycle of the one live channel
//!
//! Every `connect` opens a channel under a fresh generation number and every
//! event the channel reports carries that number back. Events from any other
//! generation belong to a channel that was already replaced and are ignored.

use std::sync::mpsc::Sender;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::credentials::CredentialPool;
use super::turn_queue::TurnSink;
use super::RelayEvent;
use crate::api::gemini_live::{ChannelEvent, ChannelEvents, ChannelRequest, LiveApi, LiveChannel};
use crate::audio::FragmentScheduler;
use crate::error::{classify, mask_token, FailureKind, RelayError, RelayResult};

pub const EXHAUSTED_MESSAGE: &str = "Limit Reached. All keys exhausted.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Speaking,
    Error,
}

/// Parameters and state of the current channel. Replaced, never patched,
/// when the channel changes.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub state: SessionState,
    /// Language display name baked into the instructions
    pub language: String,
    pub voice: String,
    pub credential_index: usize,
    pub generation: u64,
}

/// What the owner of the controller needs to react to
#[derive(Debug, Clone, PartialEq)]
pub enum SessionNotice {
    Connected,
    AudioStarted,
    TurnComplete,
    Closed,
    Failed {
        kind: FailureKind,
        message: String,
        reconnecting: bool,
    },
}

pub struct SessionController<A: LiveApi> {
    api: A,
    model: String,
    pool: CredentialPool,
    credential: Option<String>,
    scheduler: Arc<FragmentScheduler>,
    events: Sender<RelayEvent>,
    session: Session,
    channel: Option<Box<dyn LiveChannel>>,
    next_generation: u64,
    last_error: Option<String>,
    /// Quota failures since the last completed turn
    failed_rotations: usize,
    /// Set by failures that retrying cannot fix
    terminal: bool,
}

impl<A: LiveApi> SessionController<A> {
    pub fn new(
        api: A,
        model: impl Into<String>,
        pool: CredentialPool,
        scheduler: Arc<FragmentScheduler>,
        events: Sender<RelayEvent>,
    ) -> Self {
        let credential = pool.current().map(str::to_string);
        Self {
            api,
            model: model.into(),
            session: Session {
                state: SessionState::Disconnected,
                language: String::new(),
                voice: String::new(),
                credential_index: pool.index(),
                generation: 0,
            },
            pool,
            credential,
            scheduler,
            events,
            channel: None,
            next_generation: 1,
            last_error: None,
            failed_rotations: 0,
            terminal: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.session.state
    }

    #[cfg(test)]
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    #[cfg(test)]
    pub fn pool(&self) -> &CredentialPool {
        &self.pool
    }

    /// The last failure was a missing model or every key exhausted. Only a
    /// restart with different settings helps.
    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    pub fn scheduler(&self) -> &Arc<FragmentScheduler> {
        &self.scheduler
    }

    /// Open a channel for `language` (display name) and `voice`.
    pub fn connect(&mut self, language: &str, voice: &str) -> RelayResult<()> {
        if self.pool.is_empty() {
            return Err(RelayError::NoCredential);
        }
        let credential = match &self.credential {
            Some(c) => c.clone(),
            None => self
                .pool
                .current()
                .map(str::to_string)
                .ok_or(RelayError::NoCredential)?,
        };

        if let Some(mut channel) = self.channel.take() {
            channel.close();
        }
        self.terminal = false;

        let generation = self.next_generation;
        self.next_generation += 1;
        self.session = Session {
            state: SessionState::Connecting,
            language: language.to_string(),
            voice: voice.to_string(),
            credential_index: self.pool.index(),
            generation,
        };
        info!(
            "Connecting (generation {}, {} / {}, key {})",
            generation,
            language,
            voice,
            mask_token(&credential)
        );

        let tx = self.events.clone();
        let events = ChannelEvents::new(move |event| {
            let _ = tx.send(RelayEvent::Channel { generation, event });
        });
        let request = ChannelRequest {
            credential,
            model: self.model.clone(),
            language: language.to_string(),
            voice: voice.to_string(),
        };

        match self.api.open(request, events) {
            Ok(channel) => {
                self.channel = Some(channel);
                Ok(())
            }
            Err(e) => {
                warn!("Channel open failed: {}", e);
                self.session.state = SessionState::Error;
                self.last_error = Some(FailureKind::Link.message().to_string());
                Err(e)
            }
        }
    }

    /// Apply one channel event. Stale generations are ignored.
    pub fn dispatch(&mut self, generation: u64, event: ChannelEvent) -> Option<SessionNotice> {
        if generation != self.session.generation {
            debug!(
                "Ignoring event from generation {} (current {})",
                generation, self.session.generation
            );
            return None;
        }

        match event {
            ChannelEvent::Opened => {
                self.session.state = SessionState::Connected;
                self.last_error = None;
                Some(SessionNotice::Connected)
            }
            ChannelEvent::Fragment(fragment) => {
                self.scheduler.submit(fragment);
                if self.session.state == SessionState::Connected {
                    self.session.state = SessionState::Speaking;
                    return Some(SessionNotice::AudioStarted);
                }
                None
            }
            ChannelEvent::TurnComplete => {
                debug!("Turn complete");
                self.failed_rotations = 0;
                Some(SessionNotice::TurnComplete)
            }
            ChannelEvent::Errored(cause) => Some(self.handle_failure(&cause)),
            ChannelEvent::Closed => {
                self.channel = None;
                if self.session.state != SessionState::Error {
                    self.session.state = SessionState::Disconnected;
                }
                Some(SessionNotice::Closed)
            }
        }
    }

    fn handle_failure(&mut self, cause: &str) -> SessionNotice {
        let kind = classify(cause);
        warn!("Channel failure ({:?}): {}", kind, cause);
        self.session.state = SessionState::Error;

        match kind {
            FailureKind::Quota => {}
            FailureKind::NotFound => {
                self.terminal = true;
                return self.fail(kind, kind.message(), false);
            }
            FailureKind::Link => return self.fail(kind, kind.message(), false),
        }

        // One full lap, ending with a second try of the key that failed first
        self.failed_rotations += 1;
        if self.failed_rotations > self.pool.len() {
            warn!("Every credential hit its limit; not rotating further");
            self.terminal = true;
            return self.fail(kind, EXHAUSTED_MESSAGE, false);
        }

        self.pool.rotate();
        let next = self.pool.current().map(str::to_string);
        info!(
            "Rotating to credential {} of {}",
            self.pool.index() + 1,
            self.pool.len()
        );
        if let Some(token) = next {
            self.update_credential(token);
        }

        let language = self.session.language.clone();
        let voice = self.session.voice.clone();
        self.disconnect();
        match self.connect(&language, &voice) {
            Ok(()) => self.fail(kind, kind.message(), true),
            Err(e) => {
                warn!("Reconnect after rotation failed: {}", e);
                self.session.state = SessionState::Error;
                self.fail(kind, kind.message(), false)
            }
        }
    }

    fn fail(&mut self, kind: FailureKind, message: &str, reconnecting: bool) -> SessionNotice {
        self.last_error = Some(message.to_string());
        SessionNotice::Failed {
            kind,
            message: message.to_string(),
            reconnecting,
        }
    }

    /// Submit `text` as one complete turn.
    pub fn send_text(&mut self, text: &str) -> RelayResult<()> {
        if !self.is_ready() {
            return Err(RelayError::NotConnected);
        }
        let channel = self.channel.as_mut().ok_or(RelayError::NotConnected)?;
        channel.send_text(text)
    }

    /// Stop all audio, close the channel and forget it.
    pub fn disconnect(&mut self) {
        self.scheduler.stop_all();
        if let Some(mut channel) = self.channel.take() {
            channel.close();
        }
        let generation = self.next_generation;
        self.next_generation += 1;
        self.session = Session {
            state: SessionState::Disconnected,
            generation,
            credential_index: self.pool.index(),
            ..self.session.clone()
        };
        debug!("Disconnected (generation {})", generation);
    }

    /// Bind a different key for the next connect. Does not reconnect.
    pub fn update_credential(&mut self, token: impl Into<String>) {
        self.credential = Some(token.into());
    }

    /// The active playback set emptied.
    pub fn on_audio_ended(&mut self) {
        if self.session.state == SessionState::Speaking {
            self.session.state = SessionState::Connected;
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(
            self.session.state,
            SessionState::Connected | SessionState::Speaking
        )
    }
}

impl<A: LiveApi> TurnSink for SessionController<A> {
    fn is_ready(&self) -> bool {
        SessionController::is_ready(self)
    }

    fn send_text(&mut self, text: &str) -> RelayResult<()> {
        SessionController::send_text(self, text)
    }
}
