// SPDX-License-Identifier: GPL-3.0-only

//! Error taxonomy shared by the block library, the daemon and the bus

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error name prefix on the bus
pub const ERROR_PREFIX: &str = "org.storaged.Storaged.Error";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IscsiErrorKind {
    CommunicationFailed,
    HostNotFound,
    Idmb,
    LoginFailed,
    LoginAuthFailed,
    LoginFatal,
    LogoutFailed,
    NoFirmware,
    NoObjectsFound,
    NotConnected,
    TransportFailed,
    UnknownDiscoveryType,
}

impl IscsiErrorKind {
    pub const ALL: [Self; 12] = [
        Self::CommunicationFailed,
        Self::HostNotFound,
        Self::Idmb,
        Self::LoginFailed,
        Self::LoginAuthFailed,
        Self::LoginFatal,
        Self::LogoutFailed,
        Self::NoFirmware,
        Self::NoObjectsFound,
        Self::NotConnected,
        Self::TransportFailed,
        Self::UnknownDiscoveryType,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::CommunicationFailed => "CommunicationFailed",
            Self::HostNotFound => "HostNotFound",
            Self::Idmb => "IDMB",
            Self::LoginFailed => "LoginFailed",
            Self::LoginAuthFailed => "LoginAuthFailed",
            Self::LoginFatal => "LoginFatal",
            Self::LogoutFailed => "LogoutFailed",
            Self::NoFirmware => "NoFirmware",
            Self::NoObjectsFound => "NoObjectsFound",
            Self::NotConnected => "NotConnected",
            Self::TransportFailed => "TransportFailed",
            Self::UnknownDiscoveryType => "UnknownDiscoveryType",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageErrorKind {
    Failed,
    PermissionDenied,
    Busy,
    Cancelled,
    Inhibited,
    InvalidOption,
    NotSupported,
    WouldWakeup,
    FilesystemDriverMissing,
    FilesystemToolsMissing,
    Iscsi(IscsiErrorKind),
}

impl StorageErrorKind {
    /// Unqualified error name (`Failed`, `ISCSI.LoginFailed`, ...)
    pub fn name(self) -> String {
        match self {
            Self::Failed => "Failed".to_string(),
            Self::PermissionDenied => "PermissionDenied".to_string(),
            Self::Busy => "Busy".to_string(),
            Self::Cancelled => "Cancelled".to_string(),
            Self::Inhibited => "Inhibited".to_string(),
            Self::InvalidOption => "InvalidOption".to_string(),
            Self::NotSupported => "NotSupported".to_string(),
            Self::WouldWakeup => "WouldWakeup".to_string(),
            Self::FilesystemDriverMissing => "FilesystemDriverMissing".to_string(),
            Self::FilesystemToolsMissing => "FilesystemToolsMissing".to_string(),
            Self::Iscsi(kind) => format!("ISCSI.{}", kind.name()),
        }
    }

    /// Fully qualified D-Bus error name
    pub fn dbus_name(self) -> String {
        format!("{ERROR_PREFIX}.{}", self.name())
    }

    /// Inverse of [`Self::dbus_name`]; `None` for names outside the daemon's namespace
    pub fn from_dbus_name(name: &str) -> Option<Self> {
        let name = name.strip_prefix(ERROR_PREFIX)?.strip_prefix('.')?;
        if let Some(iscsi) = name.strip_prefix("ISCSI.") {
            return IscsiErrorKind::ALL
                .into_iter()
                .find(|kind| kind.name() == iscsi)
                .map(Self::Iscsi);
        }
        [
            Self::Failed,
            Self::PermissionDenied,
            Self::Busy,
            Self::Cancelled,
            Self::Inhibited,
            Self::InvalidOption,
            Self::NotSupported,
            Self::WouldWakeup,
            Self::FilesystemDriverMissing,
            Self::FilesystemToolsMissing,
        ]
        .into_iter()
        .find(|kind| kind.name() == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct StorageError {
    pub kind: StorageErrorKind,
    pub message: String,
}

impl StorageError {
    pub fn new(kind: StorageErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(StorageErrorKind::Failed, message)
    }

    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::new(StorageErrorKind::NotSupported, message)
    }

    pub fn iscsi(kind: IscsiErrorKind, message: impl Into<String>) -> Self {
        Self::new(StorageErrorKind::Iscsi(kind), message)
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::failed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_error_roundtrips() {
        let error = StorageError::iscsi(IscsiErrorKind::LoginAuthFailed, "bad chap secret");
        let json = serde_json::to_string(&error).expect("serialize error");
        let parsed: StorageError = serde_json::from_str(&json).expect("deserialize error");
        assert_eq!(parsed, error);
    }

    #[test]
    fn wire_names_are_stable() {
        assert_eq!(
            StorageErrorKind::Failed.dbus_name(),
            "org.storaged.Storaged.Error.Failed"
        );
        assert_eq!(
            StorageErrorKind::Iscsi(IscsiErrorKind::Idmb).dbus_name(),
            "org.storaged.Storaged.Error.ISCSI.IDMB"
        );
        assert_eq!(
            StorageErrorKind::FilesystemToolsMissing.name(),
            "FilesystemToolsMissing"
        );
    }

    #[test]
    fn dbus_names_parse_back() {
        let kind = StorageErrorKind::Iscsi(IscsiErrorKind::NoObjectsFound);
        assert_eq!(StorageErrorKind::from_dbus_name(&kind.dbus_name()), Some(kind));
        assert_eq!(
            StorageErrorKind::from_dbus_name("org.storaged.Storaged.Error.Busy"),
            Some(StorageErrorKind::Busy)
        );
        assert_eq!(
            StorageErrorKind::from_dbus_name("org.freedesktop.DBus.Error.Failed"),
            None
        );
    }
}
