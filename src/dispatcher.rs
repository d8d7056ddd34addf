//! Turns server invocations into commands and routes them.
//!
//! Key commands go to the [`KeyWriter`] queue in arrival order. Everything
//! else is handed back to the caller for the lifecycle to act on.

use tracing::{debug, info, warn};

use crate::error::DaemonError;
use crate::hub::{ErrorResult, Invocation, ServerAction, ServerMessage};
use crate::keys::{KeyOperation, KeySet, KeyWriter};

/// A decoded server instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    InitKeys(KeySet),
    AddKeys(KeySet),
    RemoveKeys(KeySet),
    Action(ServerAction),
    /// The server reported an error and expects the daemon to stop.
    Error {
        status_code: Option<i32>,
        messages: Vec<String>,
        exception: Option<String>,
    },
    /// The server refused the socket after the HTTP step succeeded.
    AuthenticationRejected {
        messages: Vec<String>,
        exception: Option<String>,
    },
}

impl Command {
    /// Map a decoded message onto a command. Successful authentication
    /// acknowledgements carry nothing to act on and yield `None`.
    pub fn from_message(message: ServerMessage) -> Option<Self> {
        match message {
            ServerMessage::AuthenticationStatus { ok: true, .. } => None,
            ServerMessage::AuthenticationStatus { ok: false, error } => {
                Some(Command::AuthenticationRejected {
                    messages: error.message_list(),
                    exception: error.exception,
                })
            }
            ServerMessage::InitKeys(keys) => Some(Command::InitKeys(keys)),
            ServerMessage::AddKeys(keys) => Some(Command::AddKeys(keys)),
            ServerMessage::RemoveKeys(keys) => Some(Command::RemoveKeys(keys)),
            ServerMessage::ServerActions(action) => Some(Command::Action(action)),
            ServerMessage::Error(result) => Some(error_command(result)),
        }
    }

    /// The key file edit this command asks for, if any.
    pub fn key_operation(&self) -> Option<KeyOperation> {
        match self {
            Command::InitKeys(keys) => Some(KeyOperation::ReplaceAll(keys.clone())),
            Command::AddKeys(keys) => Some(KeyOperation::Add(keys.clone())),
            Command::RemoveKeys(keys) => Some(KeyOperation::Remove(keys.clone())),
            _ => None,
        }
    }
}

fn error_command(result: ErrorResult<Vec<String>>) -> Command {
    let messages = result.message_list();
    if !result.has_detail() {
        warn!("Server sent an error with no error detail");
    }
    Command::Error {
        status_code: result.status_code,
        messages,
        exception: result.exception,
    }
}

/// Routes one connection's invocations.
#[derive(Clone)]
pub struct CommandDispatcher {
    writer: KeyWriter,
}

impl CommandDispatcher {
    pub fn new(writer: KeyWriter) -> Self {
        Self { writer }
    }

    /// Handle one invocation.
    ///
    /// Key edits are queued on the writer before this returns, so calling
    /// it in arrival order preserves that order on disk. Returns the
    /// command when the lifecycle has to act on it.
    pub fn on_message(&self, invocation: Invocation) -> Result<Option<Command>, DaemonError> {
        let target = invocation.target.clone();
        let message = match ServerMessage::from_invocation(invocation) {
            Ok(Some(message)) => message,
            Ok(None) => {
                debug!("Ignoring unknown server method {}", target);
                return Ok(None);
            }
            Err(e) => {
                warn!("Dropping undecodable {} message: {}", target, e);
                return Ok(None);
            }
        };

        let Some(command) = Command::from_message(message) else {
            info!("Hub accepted the session");
            return Ok(None);
        };

        match command.key_operation() {
            Some(op) => {
                debug!("Queueing {} for {} key(s)", op.name(), op.keys().len());
                self.writer.submit(op)?;
                Ok(None)
            }
            None => Ok(Some(command)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{KeyFileEditor, REGION_FOOTER, REGION_HEADER};
    use serde_json::json;
    use tempfile::TempDir;

    fn invocation(target: &str, arguments: Vec<serde_json::Value>) -> Invocation {
        Invocation::new(target, arguments)
    }

    fn setup(content: &str) -> (TempDir, KeyFileEditor, CommandDispatcher) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("authorized_keys");
        std::fs::write(&path, content).unwrap();
        let editor = KeyFileEditor::new(path);
        let writer = KeyWriter::spawn(editor.clone(), Box::new(|_| {}));
        (dir, editor, CommandDispatcher::new(writer))
    }

    #[tokio::test]
    async fn test_add_remove_add_keeps_arrival_order() {
        let (_dir, editor, dispatcher) = setup(&format!("{}\n{}\n", REGION_HEADER, REGION_FOOTER));

        for (target, key) in [("AddKeys", "a"), ("RemoveKeys", "a"), ("AddKeys", "b")] {
            let routed = dispatcher
                .on_message(invocation(target, vec![json!([key])]))
                .unwrap();
            assert_eq!(routed, None);
        }
        dispatcher.writer.flush().await.unwrap();

        assert_eq!(editor.managed_keys().await.unwrap(), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_init_keys_replaces_region() {
        let (_dir, editor, dispatcher) =
            setup(&format!("{}\nold\n{}\n", REGION_HEADER, REGION_FOOTER));

        dispatcher
            .on_message(invocation("InitKeys", vec![json!(["k1", "k2"])]))
            .unwrap();
        dispatcher.writer.flush().await.unwrap();

        assert_eq!(
            editor.managed_keys().await.unwrap(),
            vec!["k1".to_string(), "k2".to_string()]
        );
    }

    #[tokio::test]
    async fn test_control_commands_are_returned() {
        let (_dir, _editor, dispatcher) = setup("");

        assert_eq!(
            dispatcher
                .on_message(invocation("ServerActions", vec![json!(1)]))
                .unwrap(),
            Some(Command::Action(ServerAction::Reconnect))
        );

        assert_eq!(
            dispatcher
                .on_message(invocation(
                    "Error",
                    vec![json!({"messages": ["server removed"], "statusCode": 410})]
                ))
                .unwrap(),
            Some(Command::Error {
                status_code: Some(410),
                messages: vec!["server removed".to_string()],
                exception: None
            })
        );
    }

    #[tokio::test]
    async fn test_authentication_status() {
        let (_dir, _editor, dispatcher) = setup("");

        assert_eq!(
            dispatcher
                .on_message(invocation("AuthenticationStatus", vec![json!(true), json!(null)]))
                .unwrap(),
            None
        );

        assert_eq!(
            dispatcher
                .on_message(invocation(
                    "AuthenticationStatus",
                    vec![json!(false), json!({"messages": ["token revoked"]})]
                ))
                .unwrap(),
            Some(Command::AuthenticationRejected {
                messages: vec!["token revoked".to_string()],
                exception: None
            })
        );
    }

    #[tokio::test]
    async fn test_error_without_messages_still_forwarded() {
        let (_dir, _editor, dispatcher) = setup("");
        let routed = dispatcher
            .on_message(invocation("Error", vec![json!(null)]))
            .unwrap();
        assert_eq!(
            routed,
            Some(Command::Error {
                status_code: None,
                messages: vec![],
                exception: None
            })
        );
    }

    #[tokio::test]
    async fn test_unknown_and_malformed_messages_are_dropped() {
        let (_dir, _editor, dispatcher) = setup("");
        assert_eq!(
            dispatcher.on_message(invocation("Mystery", vec![])).unwrap(),
            None
        );
        assert_eq!(
            dispatcher
                .on_message(invocation("ServerActions", vec![json!("later")]))
                .unwrap(),
            None
        );
    }

    #[test]
    fn test_key_operation_mapping() {
        assert_eq!(
            Command::InitKeys(vec!["k".to_string()]).key_operation(),
            Some(KeyOperation::ReplaceAll(vec!["k".to_string()]))
        );
        assert_eq!(Command::Action(ServerAction::Logout).key_operation(), None);
    }
}
