//! The relay: transcript text in, translated speech out.
//!
//! Everything that mutates the turn queue or the session runs on the thread
//! that calls [`Relay::run`]. Channel workers, decode workers, the audio
//! callback and the poller only ever post [`RelayEvent`]s to it.

pub mod credentials;
pub mod poller;
pub mod session;
pub mod turn_queue;

use std::sync::mpsc::Receiver;
use tracing::{debug, info, warn};

use crate::api::gemini_live::{ChannelEvent, LiveApi};
use crate::audio::PlaybackEvent;
use crate::error::{FailureKind, RelayError, RelayResult};

pub use credentials::CredentialPool;
pub use poller::Poller;
pub use session::SessionController;

use session::{SessionNotice, SessionState};
use turn_queue::TurnQueue;

#[derive(Debug)]
pub enum RelayEvent {
    /// Something happened on the channel opened under `generation`
    Channel { generation: u64, event: ChannelEvent },
    Playback(PlaybackEvent),
    /// Latest text from the transcript store
    Transcript(String),
    /// Text typed by the user
    Speak(String),
    /// Ctrl-C: drop queued text, close the channel and return from `run`
    Shutdown,
}

/// What a user-facing indicator shows
#[derive(Debug, Clone, PartialEq)]
pub enum RelayStatus {
    Idle,
    /// A turn was sent and no audio has come back yet
    Buffering,
    Speaking,
    Error(String),
}

enum Flow {
    Continue,
    Stop,
}

pub type StatusObserver = Box<dyn FnMut(&RelayStatus)>;

pub struct Relay<A: LiveApi> {
    controller: SessionController<A>,
    queue: TurnQueue,
    events: Receiver<RelayEvent>,
    language: String,
    voice: String,
    status: RelayStatus,
    observer: Option<StatusObserver>,
    exit_when_idle: bool,
    spoke: bool,
    /// New text is being discarded because the session failed for good
    dropping: bool,
    fatal: Option<RelayError>,
}

impl<A: LiveApi> Relay<A> {
    /// `language` is the display name used in the session instructions.
    pub fn new(
        controller: SessionController<A>,
        events: Receiver<RelayEvent>,
        language: impl Into<String>,
        voice: impl Into<String>,
    ) -> Self {
        Self {
            controller,
            queue: TurnQueue::new(),
            events,
            language: language.into(),
            voice: voice.into(),
            status: RelayStatus::Idle,
            observer: None,
            exit_when_idle: false,
            spoke: false,
            dropping: false,
            fatal: None,
        }
    }

    pub fn on_status(mut self, observer: impl FnMut(&RelayStatus) + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Return from `run` once queued text has been spoken.
    pub fn exit_when_idle(mut self, exit: bool) -> Self {
        self.exit_when_idle = exit;
        self
    }

    #[cfg(test)]
    pub fn status(&self) -> &RelayStatus {
        &self.status
    }

    #[cfg(test)]
    pub fn controller(&self) -> &SessionController<A> {
        &self.controller
    }

    #[cfg(test)]
    pub fn queue(&self) -> &TurnQueue {
        &self.queue
    }

    /// Open the session.
    pub fn start(&mut self) -> RelayResult<()> {
        if let Err(e) = self.controller.connect(&self.language, &self.voice) {
            let message = self
                .controller
                .last_error()
                .unwrap_or(FailureKind::Link.message())
                .to_string();
            self.set_status(RelayStatus::Error(message));
            return Err(e);
        }
        Ok(())
    }

    /// Process events until shutdown (or until idle in speak mode).
    pub fn run(&mut self) -> RelayResult<()> {
        while let Ok(event) = self.events.recv() {
            if let Flow::Stop = self.handle(event) {
                break;
            }
        }
        self.queue.clear();
        self.controller.disconnect();
        match self.fatal.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn handle(&mut self, event: RelayEvent) -> Flow {
        match event {
            RelayEvent::Channel { generation, event } => {
                if let Some(notice) = self.controller.dispatch(generation, event) {
                    self.on_notice(notice);
                }
            }
            RelayEvent::Playback(PlaybackEvent::Ended) => {
                self.controller.on_audio_ended();
                if self.status == RelayStatus::Speaking {
                    self.settle_status();
                }
            }
            RelayEvent::Transcript(text) => self.submit(text),
            RelayEvent::Speak(text) => {
                self.spoke = true;
                self.submit(text);
            }
            RelayEvent::Shutdown => {
                info!("Shutting down relay");
                return Flow::Stop;
            }
        }

        if self.fatal.is_some() || self.finished_speaking() {
            return Flow::Stop;
        }
        Flow::Continue
    }

    fn on_notice(&mut self, notice: SessionNotice) {
        match notice {
            SessionNotice::Connected => {
                info!("Relay connected");
                self.settle_status();
                self.advance();
            }
            SessionNotice::AudioStarted => self.set_status(RelayStatus::Speaking),
            SessionNotice::TurnComplete => {
                self.queue.on_turn_complete(&mut self.controller);
                if self.status != RelayStatus::Speaking {
                    self.settle_status();
                }
            }
            SessionNotice::Closed => {
                // No completion will come for a turn sent on a dead channel
                self.queue.release();
                if self.controller.state() != SessionState::Error {
                    self.settle_status();
                }
            }
            SessionNotice::Failed {
                kind,
                message,
                reconnecting,
            } => {
                self.queue.release();
                self.set_status(RelayStatus::Error(message.clone()));
                if !reconnecting && self.exit_when_idle {
                    self.fatal = Some(RelayError::from_failure(kind, message));
                }
            }
        }
    }

    fn submit(&mut self, text: String) {
        if self.controller.is_terminal() {
            if !self.dropping {
                warn!("Session cannot recover; discarding new text until restart");
                self.dropping = true;
            }
            return;
        }
        self.dropping = false;

        if !self.queue.enqueue(text) {
            return;
        }
        // A channel that closed cleanly or dropped on a link error is
        // reopened on demand
        if matches!(
            self.controller.state(),
            SessionState::Disconnected | SessionState::Error
        ) {
            debug!("Reconnecting for queued text");
            if let Err(e) = self.controller.connect(&self.language, &self.voice) {
                warn!("Reconnect failed: {}", e);
            }
        }
        self.advance();
    }

    fn advance(&mut self) {
        self.queue.try_advance(&mut self.controller);
        if self.queue.is_busy() && self.status == RelayStatus::Idle {
            self.set_status(RelayStatus::Buffering);
        }
    }

    /// Status implied by the queue once nothing is audibly playing
    fn settle_status(&mut self) {
        let status = if self.queue.is_busy() {
            RelayStatus::Buffering
        } else {
            RelayStatus::Idle
        };
        self.set_status(status);
    }

    fn finished_speaking(&self) -> bool {
        let scheduler = self.controller.scheduler();
        self.exit_when_idle
            && self.spoke
            && self.queue.is_idle()
            && scheduler.pending() == 0
            && !scheduler.is_playing()
    }

    fn set_status(&mut self, status: RelayStatus) {
        if self.status == status {
            return;
        }
        debug!("Status: {:?}", status);
        self.status = status;
        if let Some(observer) = self.observer.as_mut() {
            observer(&self.status);
        }
    }
}
