//! Errors raised while checking or editing the authorized keys file.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

/// Key file error variants.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyFileError {
    /// The file, or its directory, does not exist.
    NotFound { path: PathBuf },

    /// The file exists but cannot be opened for both reading and writing.
    PermissionDenied { path: PathBuf },

    /// The managed region is missing a marker line needed by the operation.
    RegionNotFound { path: PathBuf, marker: &'static str },

    /// Any other I/O failure.
    Io {
        path: PathBuf,
        operation: &'static str,
        message: String,
    },
}

impl KeyFileError {
    /// Path of the file the error refers to.
    pub fn path(&self) -> &Path {
        match self {
            KeyFileError::NotFound { path }
            | KeyFileError::PermissionDenied { path }
            | KeyFileError::RegionNotFound { path, .. }
            | KeyFileError::Io { path, .. } => path,
        }
    }

    /// True for the startup access failures (missing file, no permission).
    pub fn is_access_error(&self) -> bool {
        matches!(
            self,
            KeyFileError::NotFound { .. } | KeyFileError::PermissionDenied { .. }
        )
    }

    /// Get a short error code for logging.
    pub fn error_code(&self) -> &'static str {
        match self {
            KeyFileError::NotFound { .. } => "E_KEYS_NOT_FOUND",
            KeyFileError::PermissionDenied { .. } => "E_KEYS_PERM",
            KeyFileError::RegionNotFound { .. } => "E_KEYS_REGION",
            KeyFileError::Io { .. } => "E_KEYS_IO",
        }
    }

    /// Get a user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            KeyFileError::NotFound { path } => {
                format!("Authorized keys file '{}' does not exist.", path.display())
            }
            KeyFileError::PermissionDenied { path } => format!(
                "The daemon does not have permission to read and write '{}'.",
                path.display()
            ),
            KeyFileError::RegionNotFound { path, .. } => format!(
                "'{}' has no ACCES.SH section; the file can no longer be managed.",
                path.display()
            ),
            KeyFileError::Io {
                path, operation, ..
            } => format!("Failed to {} '{}'.", operation, path.display()),
        }
    }
}

/// Classify an I/O error raised while touching `path`.
///
/// `NotFound` and `PermissionDenied` get their own variants; everything else
/// is wrapped as [`KeyFileError::Io`].
pub fn classify_io_error(path: &Path, operation: &'static str, err: io::Error) -> KeyFileError {
    match err.kind() {
        io::ErrorKind::NotFound => KeyFileError::NotFound {
            path: path.to_path_buf(),
        },
        io::ErrorKind::PermissionDenied => KeyFileError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => KeyFileError::Io {
            path: path.to_path_buf(),
            operation,
            message: err.to_string(),
        },
    }
}

impl fmt::Display for KeyFileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyFileError::NotFound { path } => {
                write!(f, "Key file not found: '{}'", path.display())
            }
            KeyFileError::PermissionDenied { path } => {
                write!(f, "Permission denied on key file '{}'", path.display())
            }
            KeyFileError::RegionNotFound { path, marker } => {
                write!(f, "Marker '{}' not found in '{}'", marker, path.display())
            }
            KeyFileError::Io {
                path,
                operation,
                message,
            } => write!(f, "Failed to {} '{}': {}", operation, path.display(), message),
        }
    }
}

impl std::error::Error for KeyFileError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_not_found() {
        let err = classify_io_error(
            Path::new("/tmp/keys"),
            "open",
            io::Error::from(io::ErrorKind::NotFound),
        );
        assert!(matches!(err, KeyFileError::NotFound { .. }));
        assert!(err.is_access_error());
    }

    #[test]
    fn test_classify_permission_denied() {
        let err = classify_io_error(
            Path::new("/tmp/keys"),
            "open",
            io::Error::from(io::ErrorKind::PermissionDenied),
        );
        assert_eq!(
            err,
            KeyFileError::PermissionDenied {
                path: PathBuf::from("/tmp/keys")
            }
        );
    }

    #[test]
    fn test_classify_other_is_io() {
        let err = classify_io_error(
            Path::new("/tmp/keys"),
            "write",
            io::Error::new(io::ErrorKind::Other, "disk on fire"),
        );
        assert!(!err.is_access_error());
        assert_eq!(err.to_string(), "Failed to write '/tmp/keys': disk on fire");
    }
}
