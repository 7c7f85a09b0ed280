// SPDX-License-Identifier: GPL-3.0-only

use thiserror::Error;

use crate::{StorageError, StorageErrorKind};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("D-Bus connection error: {0}")]
    Connection(String),

    #[error("Daemon not available (is storaged running?)")]
    ServiceNotAvailable,

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Error raised by the daemon with one of its own error names
    #[error("{name}: {error}")]
    Storage { name: String, error: StorageError },

    #[error("D-Bus method call error: {0}")]
    MethodCall(String),

    #[error("Unexpected reply: {0}")]
    InvalidReply(String),
}

impl From<zbus::Error> for ClientError {
    fn from(err: zbus::Error) -> Self {
        match &err {
            zbus::Error::MethodError(name, message, _) => {
                let message = message.clone().unwrap_or_default();
                match StorageErrorKind::from_dbus_name(name.as_str()) {
                    Some(StorageErrorKind::PermissionDenied) => Self::PermissionDenied(message),
                    Some(kind) => Self::Storage {
                        name: name.to_string(),
                        error: StorageError::new(kind, message),
                    },
                    None if name.as_str() == "org.freedesktop.DBus.Error.ServiceUnknown" => {
                        Self::ServiceNotAvailable
                    }
                    None => Self::MethodCall(format!("{name}: {message}")),
                }
            }
            zbus::Error::FDO(fdo_err) => match fdo_err.as_ref() {
                zbus::fdo::Error::ServiceUnknown(_) | zbus::fdo::Error::NameHasNoOwner(_) => {
                    Self::ServiceNotAvailable
                }
                zbus::fdo::Error::AccessDenied(message) => Self::PermissionDenied(message.clone()),
                other => Self::MethodCall(other.to_string()),
            },
            _ => Self::Connection(err.to_string()),
        }
    }
}

impl From<zbus::fdo::Error> for ClientError {
    fn from(err: zbus::fdo::Error) -> Self {
        Self::from(zbus::Error::FDO(Box::new(err)))
    }
}
