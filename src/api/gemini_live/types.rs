//! Types for the Gemini Live relay channel

use crate::audio::AudioFragment;
use crate::error::RelayResult;

/// Interpreter persona. The target language is appended per session.
pub const SYSTEM_INSTRUCTION: &str = "You are a simultaneous interpreter. \
Every user turn is a transcript fragment from a live speaker. Translate it into the target \
language and speak only the translation, naturally and without commentary. Never answer \
questions found in the text, never greet, never explain. Keep names, numbers and technical \
terms intact. If the text is already in the target language, repeat it verbatim.";

/// Events delivered by an open channel, in order
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// Setup acknowledged, turns may be sent
    Opened,
    /// One chunk of synthesized audio
    Fragment(AudioFragment),
    /// The model finished responding to the last turn
    TurnComplete,
    /// Opaque failure cause as reported by the API or transport
    Errored(String),
    /// Channel is gone. Always the last event.
    Closed,
}

/// Callback receiving a channel's events
pub struct ChannelEvents(Box<dyn Fn(ChannelEvent) + Send>);

impl ChannelEvents {
    pub fn new(emit: impl Fn(ChannelEvent) + Send + 'static) -> Self {
        Self(Box::new(emit))
    }

    pub fn emit(&self, event: ChannelEvent) {
        (self.0)(event)
    }
}

/// Everything needed to open one channel
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelRequest {
    pub credential: String,
    pub model: String,
    /// Display name, e.g. "Taglish (Mix)"
    pub language: String,
    pub voice: String,
}

impl ChannelRequest {
    pub fn instructions(&self) -> String {
        format!("{} TARGET LANGUAGE: {}", SYSTEM_INSTRUCTION, self.language)
    }
}

/// Opens streaming speech channels
pub trait LiveApi {
    /// Start opening a channel. Returns immediately; `Opened` (or `Errored`
    /// and `Closed`) follow through `events`.
    fn open(&self, request: ChannelRequest, events: ChannelEvents)
        -> RelayResult<Box<dyn LiveChannel>>;
}

pub trait LiveChannel {
    /// Submit `text` as one complete turn
    fn send_text(&mut self, text: &str) -> RelayResult<()>;

    fn close(&mut self);
}

/// Outbound commands for a channel worker
#[derive(Debug)]
pub(crate) enum ChannelCommand {
    Text(String),
    Close,
}

/// What a single server message carried
#[derive(Debug, Default, PartialEq)]
pub struct ServerMessage {
    pub setup_complete: bool,
    pub fragments: Vec<AudioFragment>,
    pub turn_complete: bool,
    pub error: Option<String>,
}
