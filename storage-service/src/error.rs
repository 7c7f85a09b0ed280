// SPDX-License-Identifier: GPL-3.0-only

use storage_contracts::{IscsiErrorKind, StorageError, StorageErrorKind};
use storage_types::OptionError;
use thiserror::Error;

use crate::module::ModuleLoadError;
use crate::object_manager::TimeoutError;

/// Service-specific errors
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    ModuleLoad(#[from] ModuleLoadError),

    #[error("{0}")]
    DeviceLookup(String),

    #[error("Not authorized to perform operation {action}")]
    NotAuthorized {
        action: String,
        /// The caller could become authorized by authenticating
        could_obtain: bool,
    },

    #[error("{0}")]
    Timeout(String),

    #[error(transparent)]
    BlockLib(#[from] StorageError),

    #[error("{0}")]
    Cancelled(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    InvalidOption(#[from] OptionError),

    #[error("Invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("D-Bus error: {0}")]
    Bus(String),
}

impl ServiceError {
    pub fn timeout(what: &str, err: TimeoutError) -> Self {
        Self::Timeout(format!("{what}: {err}"))
    }

    /// Wire error name this error is reported under
    pub fn kind(&self) -> StorageErrorKind {
        match self {
            Self::NotAuthorized { .. } => StorageErrorKind::PermissionDenied,
            Self::BlockLib(err) => err.kind,
            Self::Cancelled(_) => StorageErrorKind::Cancelled,
            Self::InvalidOption(_) => StorageErrorKind::InvalidOption,
            Self::ModuleLoad(_)
            | Self::DeviceLookup(_)
            | Self::Timeout(_)
            | Self::InvalidArgument(_)
            | Self::InvariantViolation(_)
            | Self::Config(_)
            | Self::Bus(_) => StorageErrorKind::Failed,
        }
    }
}

impl From<zbus::Error> for ServiceError {
    fn from(err: zbus::Error) -> Self {
        ServiceError::Bus(err.to_string())
    }
}

impl From<storage_sys::SysError> for ServiceError {
    fn from(err: storage_sys::SysError) -> Self {
        ServiceError::BlockLib(err.into())
    }
}

impl From<tokio::task::JoinError> for ServiceError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            ServiceError::Cancelled("Operation was cancelled".to_string())
        } else {
            ServiceError::InvariantViolation(format!("Worker task failed: {err}"))
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;

/// Errors as they are returned to bus clients
#[derive(Debug, zbus::DBusError)]
#[zbus(prefix = "org.storaged.Storaged.Error")]
pub enum WireError {
    #[zbus(error)]
    ZBus(zbus::Error),
    Failed(String),
    PermissionDenied(String),
    Busy(String),
    Cancelled(String),
    Inhibited(String),
    InvalidOption(String),
    NotSupported(String),
    WouldWakeup(String),
    FilesystemDriverMissing(String),
    FilesystemToolsMissing(String),
    #[zbus(name = "ISCSI.CommunicationFailed")]
    IscsiCommunicationFailed(String),
    #[zbus(name = "ISCSI.HostNotFound")]
    IscsiHostNotFound(String),
    #[zbus(name = "ISCSI.IDMB")]
    IscsiIdmb(String),
    #[zbus(name = "ISCSI.LoginFailed")]
    IscsiLoginFailed(String),
    #[zbus(name = "ISCSI.LoginAuthFailed")]
    IscsiLoginAuthFailed(String),
    #[zbus(name = "ISCSI.LoginFatal")]
    IscsiLoginFatal(String),
    #[zbus(name = "ISCSI.LogoutFailed")]
    IscsiLogoutFailed(String),
    #[zbus(name = "ISCSI.NoFirmware")]
    IscsiNoFirmware(String),
    #[zbus(name = "ISCSI.NoObjectsFound")]
    IscsiNoObjectsFound(String),
    #[zbus(name = "ISCSI.NotConnected")]
    IscsiNotConnected(String),
    #[zbus(name = "ISCSI.TransportFailed")]
    IscsiTransportFailed(String),
    #[zbus(name = "ISCSI.UnknownDiscoveryType")]
    IscsiUnknownDiscoveryType(String),
}

impl WireError {
    pub fn new(kind: StorageErrorKind, message: String) -> Self {
        match kind {
            StorageErrorKind::Failed => Self::Failed(message),
            StorageErrorKind::PermissionDenied => Self::PermissionDenied(message),
            StorageErrorKind::Busy => Self::Busy(message),
            StorageErrorKind::Cancelled => Self::Cancelled(message),
            StorageErrorKind::Inhibited => Self::Inhibited(message),
            StorageErrorKind::InvalidOption => Self::InvalidOption(message),
            StorageErrorKind::NotSupported => Self::NotSupported(message),
            StorageErrorKind::WouldWakeup => Self::WouldWakeup(message),
            StorageErrorKind::FilesystemDriverMissing => Self::FilesystemDriverMissing(message),
            StorageErrorKind::FilesystemToolsMissing => Self::FilesystemToolsMissing(message),
            StorageErrorKind::Iscsi(kind) => match kind {
                IscsiErrorKind::CommunicationFailed => Self::IscsiCommunicationFailed(message),
                IscsiErrorKind::HostNotFound => Self::IscsiHostNotFound(message),
                IscsiErrorKind::Idmb => Self::IscsiIdmb(message),
                IscsiErrorKind::LoginFailed => Self::IscsiLoginFailed(message),
                IscsiErrorKind::LoginAuthFailed => Self::IscsiLoginAuthFailed(message),
                IscsiErrorKind::LoginFatal => Self::IscsiLoginFatal(message),
                IscsiErrorKind::LogoutFailed => Self::IscsiLogoutFailed(message),
                IscsiErrorKind::NoFirmware => Self::IscsiNoFirmware(message),
                IscsiErrorKind::NoObjectsFound => Self::IscsiNoObjectsFound(message),
                IscsiErrorKind::NotConnected => Self::IscsiNotConnected(message),
                IscsiErrorKind::TransportFailed => Self::IscsiTransportFailed(message),
                IscsiErrorKind::UnknownDiscoveryType => Self::IscsiUnknownDiscoveryType(message),
            },
        }
    }
}

impl From<ServiceError> for WireError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Bus(message) => Self::Failed(message),
            err => Self::new(err.kind(), err.to_string()),
        }
    }
}

impl From<zbus::fdo::Error> for WireError {
    fn from(err: zbus::fdo::Error) -> Self {
        Self::ZBus(zbus::Error::FDO(Box::new(err)))
    }
}
