//! Checks run before the daemon starts its session.

use std::path::Path;

use tracing::info;

use crate::auth::validate_token;
use crate::config::DaemonConfig;
use crate::error::DaemonResult;
use crate::keys::KeyFileEditor;

/// Verify the token shape and that the key file is readable and writable.
///
/// Returns the editor for the resolved key file. Nothing is written.
pub async fn run_preflight_checks(
    config: &DaemonConfig,
    cwd: &Path,
) -> DaemonResult<KeyFileEditor> {
    validate_token(&config.api_token)?;

    let editor = KeyFileEditor::new(config.key_file_path(cwd));
    editor.check_access().await?;
    info!("Managing keys in {}", editor.path().display());

    Ok(editor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MIN_TOKEN_LENGTH;
    use crate::config::RuntimeMode;
    use crate::error::{AuthError, DaemonError, KeyFileError};
    use tempfile::TempDir;

    fn config(token: &str, key_file: &Path) -> DaemonConfig {
        let mut config = DaemonConfig::from_json_str(
            r#"{"serverUrl":"https://api.acces.sh","hubUrl":"https://api.acces.sh/hubs/server"}"#,
        )
        .unwrap();
        config.api_token = token.to_string();
        config.authorized_keys_file_path = key_file.to_path_buf();
        config
    }

    #[tokio::test]
    async fn test_preflight_passes_for_writable_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("authorized_keys");
        std::fs::write(&path, "ssh-ed25519 AAAA user\n").unwrap();

        let editor = run_preflight_checks(&config(&"t".repeat(MIN_TOKEN_LENGTH), &path), dir.path())
            .await
            .unwrap();
        assert_eq!(editor.path(), path.as_path());
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "ssh-ed25519 AAAA user\n"
        );
    }

    #[tokio::test]
    async fn test_preflight_rejects_short_token_first() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing");

        let err = run_preflight_checks(&config("short", &missing), dir.path())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DaemonError::Auth(AuthError::InvalidToken { length: 5 })
        ));
        assert_eq!(err.exit_code(), 78);
    }

    #[tokio::test]
    async fn test_preflight_reports_missing_file() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing");

        let err = run_preflight_checks(&config(&"t".repeat(MIN_TOKEN_LENGTH), &missing), dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, DaemonError::KeyFile(KeyFileError::NotFound { .. })));
        assert_eq!(err.exit_code(), 77);
    }

    #[tokio::test]
    async fn test_docker_mode_uses_working_directory() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("authorized_keys"), "").unwrap();

        let mut config = config(&"t".repeat(MIN_TOKEN_LENGTH), Path::new("/nonexistent"));
        config.mode = RuntimeMode::Docker;

        let editor = run_preflight_checks(&config, dir.path()).await.unwrap();
        assert_eq!(editor.path(), dir.path().join("authorized_keys").as_path());
    }
}
