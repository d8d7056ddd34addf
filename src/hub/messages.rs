//! Typed messages exchanged with the hub.
//!
//! The server calls client methods by name; [`ServerMessage::from_invocation`]
//! turns an invocation into one of the known messages.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::protocol::Invocation;
use crate::error::HubError;

/// Client method names the server invokes.
pub mod targets {
    pub const AUTHENTICATION_STATUS: &str = "AuthenticationStatus";
    pub const INIT_KEYS: &str = "InitKeys";
    pub const ADD_KEYS: &str = "AddKeys";
    pub const REMOVE_KEYS: &str = "RemoveKeys";
    pub const SERVER_ACTIONS: &str = "ServerActions";
    pub const ERROR: &str = "Error";

    /// Server method asking for a fresh `InitKeys`.
    pub const GET_KEYS: &str = "GetKeys";
}

/// Control action pushed by the server. Encoded on the wire as an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ServerAction {
    Authentication = 0,
    Reconnect = 1,
    Logout = 2,
    Removed = 3,
}

impl TryFrom<u8> for ServerAction {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ServerAction::Authentication),
            1 => Ok(ServerAction::Reconnect),
            2 => Ok(ServerAction::Logout),
            3 => Ok(ServerAction::Removed),
            other => Err(format!("unknown server action {}", other)),
        }
    }
}

impl From<ServerAction> for u8 {
    fn from(action: ServerAction) -> Self {
        action as u8
    }
}

impl fmt::Display for ServerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServerAction::Authentication => "Authentication",
            ServerAction::Reconnect => "Reconnect",
            ServerAction::Logout => "Logout",
            ServerAction::Removed => "Removed",
        };
        f.write_str(name)
    }
}

/// Error envelope used by the REST API and the hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ErrorResult<T> {
    #[serde(alias = "Messages")]
    pub messages: Option<Vec<String>>,
    #[serde(alias = "Succeeded")]
    pub succeeded: bool,
    #[serde(alias = "Data")]
    pub data: Option<T>,
    #[serde(alias = "Source")]
    pub source: Option<String>,
    #[serde(alias = "Exception")]
    pub exception: Option<String>,
    #[serde(alias = "ErrorId")]
    pub error_id: Option<String>,
    #[serde(alias = "SupportMessage")]
    pub support_message: Option<String>,
    #[serde(alias = "StatusCode")]
    pub status_code: Option<i32>,
}

impl<T> Default for ErrorResult<T> {
    fn default() -> Self {
        Self {
            messages: None,
            succeeded: false,
            data: None,
            source: None,
            exception: None,
            error_id: None,
            support_message: None,
            status_code: None,
        }
    }
}

impl<T> ErrorResult<T> {
    /// Non-empty messages, in order.
    pub fn message_list(&self) -> Vec<String> {
        self.messages
            .iter()
            .flatten()
            .filter(|m| !m.trim().is_empty())
            .cloned()
            .collect()
    }

    /// True when the envelope carries anything a human could act on.
    pub fn has_detail(&self) -> bool {
        !self.message_list().is_empty() || self.exception.is_some()
    }
}

/// A decoded server invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    AuthenticationStatus {
        ok: bool,
        error: ErrorResult<String>,
    },
    InitKeys(Vec<String>),
    AddKeys(Vec<String>),
    RemoveKeys(Vec<String>),
    ServerActions(ServerAction),
    Error(ErrorResult<Vec<String>>),
}

impl ServerMessage {
    /// Decode an invocation. Unknown targets yield `Ok(None)`.
    pub fn from_invocation(invocation: Invocation) -> Result<Option<Self>, HubError> {
        let Invocation { target, arguments } = invocation;
        let mut args = arguments.into_iter();

        let message = match target.as_str() {
            targets::AUTHENTICATION_STATUS => {
                let ok = decode_arg::<bool>(&target, args.next())?;
                let error = decode_optional_arg::<ErrorResult<String>>(&target, args.next())?
                    .unwrap_or_default();
                ServerMessage::AuthenticationStatus { ok, error }
            }
            targets::INIT_KEYS => ServerMessage::InitKeys(decode_keys(&target, args.next())?),
            targets::ADD_KEYS => ServerMessage::AddKeys(decode_keys(&target, args.next())?),
            targets::REMOVE_KEYS => ServerMessage::RemoveKeys(decode_keys(&target, args.next())?),
            targets::SERVER_ACTIONS => {
                ServerMessage::ServerActions(decode_arg(&target, args.next())?)
            }
            targets::ERROR => ServerMessage::Error(
                decode_optional_arg(&target, args.next())?.unwrap_or_default(),
            ),
            _ => return Ok(None),
        };

        Ok(Some(message))
    }

    /// Method name this message arrived under.
    pub fn target(&self) -> &'static str {
        match self {
            ServerMessage::AuthenticationStatus { .. } => targets::AUTHENTICATION_STATUS,
            ServerMessage::InitKeys(_) => targets::INIT_KEYS,
            ServerMessage::AddKeys(_) => targets::ADD_KEYS,
            ServerMessage::RemoveKeys(_) => targets::REMOVE_KEYS,
            ServerMessage::ServerActions(_) => targets::SERVER_ACTIONS,
            ServerMessage::Error(_) => targets::ERROR,
        }
    }
}

/// The `GetKeys` request sent after connecting when enabled.
pub fn get_keys_invocation() -> Invocation {
    Invocation::new(targets::GET_KEYS, Vec::new())
}

fn decode_arg<T: serde::de::DeserializeOwned>(
    target: &str,
    arg: Option<Value>,
) -> Result<T, HubError> {
    let value = arg.ok_or_else(|| HubError::Protocol(format!("{}: missing argument", target)))?;
    serde_json::from_value(value).map_err(|e| HubError::Protocol(format!("{}: {}", target, e)))
}

fn decode_optional_arg<T: serde::de::DeserializeOwned>(
    target: &str,
    arg: Option<Value>,
) -> Result<Option<T>, HubError> {
    match arg {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| HubError::Protocol(format!("{}: {}", target, e))),
    }
}

/// A missing or null key list is an empty list.
fn decode_keys(target: &str, arg: Option<Value>) -> Result<Vec<String>, HubError> {
    Ok(decode_optional_arg(target, arg)?.unwrap_or_default())
}
