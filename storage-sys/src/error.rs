// SPDX-License-Identifier: GPL-3.0-only

use storage_contracts::{IscsiErrorKind, StorageError, StorageErrorKind};
use thiserror::Error;

/// Error types for system-level operations
#[derive(Error, Debug)]
pub enum SysError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Operation failed: {0}")]
    OperationFailed(String),

    #[error("Required tool {0} is not installed")]
    ToolMissing(String),

    #[error("{command} failed with exit code {code:?}: {stderr}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Failed to parse {what}: {detail}")]
    Parse { what: String, detail: String },

    #[error("{0} support is not enabled in this build")]
    Disabled(&'static str),

    #[error("{message}")]
    Iscsi {
        kind: IscsiErrorKind,
        message: String,
    },
}

impl SysError {
    pub fn parse(what: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Parse {
            what: what.into(),
            detail: detail.into(),
        }
    }
}

/// Result type alias for system operations
pub type Result<T> = std::result::Result<T, SysError>;

impl From<SysError> for StorageError {
    fn from(err: SysError) -> Self {
        let kind = match &err {
            SysError::PermissionDenied(_) => StorageErrorKind::PermissionDenied,
            SysError::ToolMissing(_) => StorageErrorKind::FilesystemToolsMissing,
            SysError::Disabled(_) => StorageErrorKind::NotSupported,
            SysError::Iscsi { kind, .. } => StorageErrorKind::Iscsi(*kind),
            SysError::Io(io) if io.kind() == std::io::ErrorKind::PermissionDenied => {
                StorageErrorKind::PermissionDenied
            }
            _ => StorageErrorKind::Failed,
        };
        StorageError::new(kind, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_tools_map_to_tools_missing() {
        let error: StorageError = SysError::ToolMissing("make-bcache".into()).into();
        assert_eq!(error.kind, StorageErrorKind::FilesystemToolsMissing);
        assert!(error.message.contains("make-bcache"));
    }

    #[test]
    fn iscsi_errors_keep_their_kind() {
        let error: StorageError = SysError::Iscsi {
            kind: IscsiErrorKind::LoginAuthFailed,
            message: "authorization failure".into(),
        }
        .into();
        assert_eq!(
            error.kind,
            StorageErrorKind::Iscsi(IscsiErrorKind::LoginAuthFailed)
        );
    }
}
