//! WebSocket connection and wire format for the Gemini Live API

use anyhow::Result;
use native_tls::TlsStream;
use std::net::TcpStream;
use std::time::Duration;
use tungstenite::WebSocket;

use super::types::{ChannelRequest, ServerMessage};
use crate::audio::AudioFragment;

pub type LiveSocket = WebSocket<TlsStream<TcpStream>>;

const LIVE_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Create TLS WebSocket connection to Gemini Live API
pub fn connect_live_websocket(api_key: &str) -> Result<LiveSocket> {
    let ws_url = format!("{}?key={}", LIVE_ENDPOINT, api_key);

    let url = url::Url::parse(&ws_url)?;
    let host = url
        .host_str()
        .ok_or_else(|| anyhow::anyhow!("No host in URL"))?;
    let port = 443;

    use std::net::ToSocketAddrs;
    let addr = format!("{}:{}", host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| anyhow::anyhow!("Failed to resolve hostname: {}", host))?;

    let tcp_stream = TcpStream::connect_timeout(&addr, Duration::from_secs(10))?;
    tcp_stream.set_read_timeout(Some(Duration::from_secs(30)))?;
    tcp_stream.set_write_timeout(Some(Duration::from_secs(30)))?;
    tcp_stream.set_nodelay(true)?;

    let connector = native_tls::TlsConnector::new()?;
    let tls_stream = connector.connect(host, tcp_stream)?;

    let (socket, _response) = tungstenite::client::client(&ws_url, tls_stream)?;

    Ok(socket)
}

/// Short read timeout so the worker can interleave outbound commands
pub fn set_poll_timeout(socket: &mut LiveSocket, timeout: Duration) -> Result<()> {
    socket.get_mut().get_mut().set_read_timeout(Some(timeout))?;
    Ok(())
}

pub fn build_setup(request: &ChannelRequest) -> serde_json::Value {
    serde_json::json!({
        "setup": {
            "model": format!("models/{}", request.model),
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": {
                        "prebuiltVoiceConfig": {
                            "voiceName": request.voice
                        }
                    }
                },
                "thinkingConfig": {
                    "thinkingBudget": 0
                }
            },
            "systemInstruction": {
                "parts": [{
                    "text": request.instructions()
                }]
            }
        }
    })
}

pub fn send_live_setup(socket: &mut LiveSocket, request: &ChannelRequest) -> Result<()> {
    let msg_str = build_setup(request).to_string();
    socket.write(tungstenite::Message::Text(msg_str.into()))?;
    socket.flush()?;
    Ok(())
}

/// A closed user turn: the model responds right away instead of waiting for
/// more input.
pub fn build_text_turn(text: &str) -> serde_json::Value {
    serde_json::json!({
        "clientContent": {
            "turns": [{
                "role": "user",
                "parts": [{ "text": text }]
            }],
            "turnComplete": true
        }
    })
}

pub fn send_live_text(socket: &mut LiveSocket, text: &str) -> Result<()> {
    socket.write(tungstenite::Message::Text(
        build_text_turn(text).to_string().into(),
    ))?;
    socket.flush()?;
    Ok(())
}

/// Parse one inbound message. Non-JSON input yields an empty message.
pub fn parse_server_message(msg: &str) -> ServerMessage {
    let mut parsed = ServerMessage::default();
    let Ok(json) = serde_json::from_str::<serde_json::Value>(msg) else {
        return parsed;
    };

    parsed.setup_complete = json.get("setupComplete").is_some();

    if let Some(error) = json.get("error") {
        parsed.error = Some(
            error
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string()),
        );
    }

    if let Some(server_content) = json.get("serverContent") {
        if let Some(parts) = server_content
            .get("modelTurn")
            .and_then(|t| t.get("parts"))
            .and_then(|p| p.as_array())
        {
            for part in parts {
                let Some(inline) = part.get("inlineData") else {
                    continue;
                };
                let data = inline.get("data").and_then(|d| d.as_str()).unwrap_or("");
                if data.is_empty() {
                    continue;
                }
                let mime = inline
                    .get("mimeType")
                    .and_then(|m| m.as_str())
                    .unwrap_or("audio/pcm;rate=24000");
                parsed.fragments.push(AudioFragment::new(mime, data));
            }
        }

        // generationComplete arrives first in the same turn; only
        // turnComplete releases the turn.
        parsed.turn_complete = server_content
            .get("turnComplete")
            .and_then(|tc| tc.as_bool())
            .unwrap_or(false);
    }

    parsed
}
