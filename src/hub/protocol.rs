//! JSON hub protocol framing.
//!
//! Every frame is a JSON object terminated by the record separator
//! (`0x1E`). A websocket text message may carry several frames. The client
//! opens with a handshake frame naming the protocol; the server answers
//! with `{}` or `{"error": "..."}` before any other frame.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::HubError;

/// Terminator appended to every frame.
pub const RECORD_SEPARATOR: char = '\u{1e}';

/// Protocol name sent in the handshake.
pub const PROTOCOL_NAME: &str = "json";

/// Protocol version sent in the handshake.
pub const PROTOCOL_VERSION: u32 = 1;

const INVOCATION: u8 = 1;
const PING: u8 = 6;
const CLOSE: u8 = 7;

/// A method call carried by an invocation frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub target: String,
    pub arguments: Vec<Value>,
}

impl Invocation {
    pub fn new(target: impl Into<String>, arguments: Vec<Value>) -> Self {
        Self {
            target: target.into(),
            arguments,
        }
    }
}

/// What a hub channel hands to its consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum HubEvent {
    /// The server invoked a client method.
    Invocation(Invocation),
    /// The channel closed without being asked to.
    Closed { error: Option<String> },
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub enum HubFrame {
    Invocation(Invocation),
    Ping,
    Close {
        error: Option<String>,
        allow_reconnect: bool,
    },
    /// A frame type this client does not act on.
    Other(u8),
}

#[derive(Serialize)]
struct HandshakeRequest<'a> {
    protocol: &'a str,
    version: u32,
}

#[derive(Debug, Default, Deserialize)]
struct HandshakeResponse {
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    arguments: Vec<Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default, rename = "allowReconnect")]
    allow_reconnect: bool,
}

#[derive(Serialize)]
struct OutgoingInvocation<'a> {
    #[serde(rename = "type")]
    kind: u8,
    target: &'a str,
    arguments: &'a [Value],
}

fn terminate(mut json: String) -> String {
    json.push(RECORD_SEPARATOR);
    json
}

/// The handshake frame that opens every connection.
pub fn handshake_request() -> String {
    let request = HandshakeRequest {
        protocol: PROTOCOL_NAME,
        version: PROTOCOL_VERSION,
    };
    // Serializing a struct of plain fields cannot fail.
    terminate(serde_json::to_string(&request).unwrap_or_default())
}

/// Check the server's handshake reply. An empty object means accepted.
pub fn parse_handshake_response(raw: &str) -> Result<(), HubError> {
    let response: HandshakeResponse = serde_json::from_str(raw)
        .map_err(|e| HubError::Protocol(format!("invalid handshake response: {}", e)))?;
    match response.error {
        Some(error) => Err(HubError::HandshakeRejected(error)),
        None => Ok(()),
    }
}

/// Split a websocket text message into frames, skipping empty pieces.
pub fn split_frames(text: &str) -> impl Iterator<Item = &str> {
    text.split(RECORD_SEPARATOR)
        .filter(|frame| !frame.trim().is_empty())
}

/// Decode a single frame without its separator.
pub fn decode_frame(raw: &str) -> Result<HubFrame, HubError> {
    let frame: RawFrame =
        serde_json::from_str(raw).map_err(|e| HubError::Protocol(e.to_string()))?;

    Ok(match frame.kind {
        INVOCATION => {
            let target = frame
                .target
                .ok_or_else(|| HubError::Protocol("invocation without target".to_string()))?;
            HubFrame::Invocation(Invocation {
                target,
                arguments: frame.arguments,
            })
        }
        PING => HubFrame::Ping,
        CLOSE => HubFrame::Close {
            error: frame.error,
            allow_reconnect: frame.allow_reconnect,
        },
        other => HubFrame::Other(other),
    })
}

/// Encode a non-blocking invocation (no invocation id, no reply expected).
pub fn encode_invocation(invocation: &Invocation) -> Result<String, HubError> {
    let frame = OutgoingInvocation {
        kind: INVOCATION,
        target: &invocation.target,
        arguments: &invocation.arguments,
    };
    serde_json::to_string(&frame)
        .map(terminate)
        .map_err(|e| HubError::Protocol(e.to_string()))
}

/// Encode a keepalive ping.
pub fn encode_ping() -> String {
    terminate(format!("{{\"type\":{}}}", PING))
}
