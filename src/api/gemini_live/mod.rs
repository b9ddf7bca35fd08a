//! Gemini Live speech channel
//!
//! One channel is one WebSocket owned by a worker thread. The caller talks to
//! it through a command queue and hears back through [`ChannelEvents`]; the
//! socket never leaves its thread.

pub mod types;
pub mod websocket;
pub mod worker;

use std::sync::mpsc;
use tracing::debug;

use crate::error::{RelayError, RelayResult};
use types::ChannelCommand;

pub use types::{ChannelEvent, ChannelEvents, ChannelRequest, LiveApi, LiveChannel};

/// Real transport to the Gemini Live API
#[derive(Debug, Default, Clone, Copy)]
pub struct GeminiLive;

impl LiveApi for GeminiLive {
    fn open(
        &self,
        request: ChannelRequest,
        events: ChannelEvents,
    ) -> RelayResult<Box<dyn LiveChannel>> {
        let (tx, rx) = mpsc::channel();
        std::thread::Builder::new()
            .name("orbit-live".to_string())
            .spawn(move || worker::run_channel_worker(request, events, rx))
            .map_err(|e| RelayError::ChannelOpen(e.to_string()))?;
        Ok(Box::new(GeminiChannel { commands: tx }))
    }
}

/// Handle to a running channel worker. Dropping it closes the channel.
pub struct GeminiChannel {
    commands: mpsc::Sender<ChannelCommand>,
}

impl LiveChannel for GeminiChannel {
    fn send_text(&mut self, text: &str) -> RelayResult<()> {
        self.commands
            .send(ChannelCommand::Text(text.to_string()))
            .map_err(|_| RelayError::Send("channel worker has exited".to_string()))
    }

    fn close(&mut self) {
        debug!("Closing live channel");
        let _ = self.commands.send(ChannelCommand::Close);
    }
}

impl Drop for GeminiChannel {
    fn drop(&mut self) {
        let _ = self.commands.send(ChannelCommand::Close);
    }
}
