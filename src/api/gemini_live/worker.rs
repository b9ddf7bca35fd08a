//! Worker thread owning one Gemini Live socket

use std::sync::mpsc::{Receiver, TryRecvError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use tungstenite::protocol::frame::coding::CloseCode;
use tungstenite::Message;

use super::types::{ChannelCommand, ChannelEvent, ChannelEvents, ChannelRequest};
use super::websocket::{
    connect_live_websocket, parse_server_message, send_live_setup, send_live_text,
    set_poll_timeout, LiveSocket,
};
use crate::error::mask_token;

const SETUP_TIMEOUT: Duration = Duration::from_secs(15);
const POLL_TIMEOUT: Duration = Duration::from_millis(50);

enum Flow {
    Continue,
    Stop,
}

/// Connect, run the channel until it ends, and always finish with `Closed`.
pub(crate) fn run_channel_worker(
    request: ChannelRequest,
    events: ChannelEvents,
    commands: Receiver<ChannelCommand>,
) {
    info!(
        "Opening live channel (model {}, voice {}, key {})",
        request.model,
        request.voice,
        mask_token(&request.credential)
    );

    match connect_live_websocket(&request.credential) {
        Ok(mut socket) => {
            run_socket(&mut socket, &request, &events, &commands);
            let _ = socket.close(None);
            let _ = socket.flush();
        }
        Err(e) => {
            warn!("Live channel connection failed: {}", e);
            events.emit(ChannelEvent::Errored(format!("Connection failed: {}", e)));
        }
    }

    debug!("Live channel closed");
    events.emit(ChannelEvent::Closed);
}

fn run_socket(
    socket: &mut LiveSocket,
    request: &ChannelRequest,
    events: &ChannelEvents,
    commands: &Receiver<ChannelCommand>,
) {
    if let Err(e) = set_poll_timeout(socket, POLL_TIMEOUT) {
        events.emit(ChannelEvent::Errored(format!("Socket setup failed: {}", e)));
        return;
    }
    if let Err(e) = send_live_setup(socket, request) {
        events.emit(ChannelEvent::Errored(format!("Setup failed: {}", e)));
        return;
    }

    let Some(held) = await_setup(socket, events, commands) else {
        return;
    };
    info!("Live channel established");
    events.emit(ChannelEvent::Opened);

    for text in held {
        if let Err(e) = send_live_text(socket, &text) {
            events.emit(ChannelEvent::Errored(format!("Send failed: {}", e)));
            return;
        }
    }

    loop {
        match drain_commands(socket, events, commands) {
            Flow::Continue => {}
            Flow::Stop => return,
        }

        match socket.read() {
            Ok(Message::Text(msg)) => {
                if let Flow::Stop = dispatch_message(msg.as_str(), events) {
                    return;
                }
            }
            Ok(Message::Binary(data)) => {
                if let Ok(text) = String::from_utf8(data.to_vec()) {
                    if let Flow::Stop = dispatch_message(&text, events) {
                        return;
                    }
                }
            }
            Ok(Message::Close(frame)) => {
                if let Some(frame) = frame {
                    if frame.code != CloseCode::Normal {
                        events.emit(ChannelEvent::Errored(format!(
                            "{}: {}",
                            u16::from(frame.code),
                            frame.reason.as_str()
                        )));
                    }
                }
                return;
            }
            Ok(_) => {}
            Err(tungstenite::Error::Io(ref e))
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(tungstenite::Error::ConnectionClosed) | Err(tungstenite::Error::AlreadyClosed) => {
                return;
            }
            Err(e) => {
                events.emit(ChannelEvent::Errored(format!("Read error: {}", e)));
                return;
            }
        }
    }
}

/// Wait for `setupComplete`. Turns submitted meanwhile are held back and
/// returned; `None` means the channel should end.
fn await_setup(
    socket: &mut LiveSocket,
    events: &ChannelEvents,
    commands: &Receiver<ChannelCommand>,
) -> Option<Vec<String>> {
    let setup_start = Instant::now();
    let mut held = Vec::new();

    loop {
        match commands.try_recv() {
            Ok(ChannelCommand::Text(text)) => held.push(text),
            Ok(ChannelCommand::Close) | Err(TryRecvError::Disconnected) => return None,
            Err(TryRecvError::Empty) => {}
        }

        let text = match socket.read() {
            Ok(Message::Text(msg)) => msg.as_str().to_string(),
            Ok(Message::Binary(data)) => String::from_utf8(data.to_vec()).unwrap_or_default(),
            Ok(Message::Close(frame)) => {
                let reason = frame
                    .map(|f| format!("{}: {}", u16::from(f.code), f.reason.as_str()))
                    .unwrap_or_else(|| "closed during setup".to_string());
                events.emit(ChannelEvent::Errored(reason));
                return None;
            }
            Ok(_) => continue,
            Err(tungstenite::Error::Io(ref e))
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                if setup_start.elapsed() > SETUP_TIMEOUT {
                    events.emit(ChannelEvent::Errored("Setup timeout".to_string()));
                    return None;
                }
                continue;
            }
            Err(e) => {
                events.emit(ChannelEvent::Errored(format!("Setup error: {}", e)));
                return None;
            }
        };

        let parsed = parse_server_message(&text);
        if let Some(error) = parsed.error {
            events.emit(ChannelEvent::Errored(error));
            return None;
        }
        if parsed.setup_complete {
            return Some(held);
        }
    }
}

fn drain_commands(
    socket: &mut LiveSocket,
    events: &ChannelEvents,
    commands: &Receiver<ChannelCommand>,
) -> Flow {
    loop {
        match commands.try_recv() {
            Ok(ChannelCommand::Text(text)) => {
                if let Err(e) = send_live_text(socket, &text) {
                    events.emit(ChannelEvent::Errored(format!("Send failed: {}", e)));
                    return Flow::Stop;
                }
            }
            Ok(ChannelCommand::Close) | Err(TryRecvError::Disconnected) => return Flow::Stop,
            Err(TryRecvError::Empty) => return Flow::Continue,
        }
    }
}

fn dispatch_message(msg: &str, events: &ChannelEvents) -> Flow {
    let parsed = parse_server_message(msg);
    if let Some(error) = parsed.error {
        events.emit(ChannelEvent::Errored(error));
        return Flow::Stop;
    }
    for fragment in parsed.fragments {
        events.emit(ChannelEvent::Fragment(fragment));
    }
    if parsed.turn_complete {
        events.emit(ChannelEvent::TurnComplete);
    }
    Flow::Continue
}
