// SPDX-License-Identifier: GPL-3.0-only

//! Built-in modules

#[cfg(feature = "mod-bcache")]
pub mod bcache;
#[cfg(feature = "mod-btrfs")]
pub mod btrfs;
#[cfg(feature = "mod-dummy")]
pub mod dummy;
#[cfg(feature = "mod-iscsi")]
pub mod iscsi;
#[cfg(feature = "mod-lvm2")]
pub mod lvm2;
#[cfg(feature = "mod-vdo")]
pub mod vdo;
#[cfg(feature = "mod-zram")]
pub mod zram;

use storage_contracts::StorageError;
use storage_types::{Device, ObjectPath};
use zbus::zvariant::OwnedObjectPath;

use crate::error::{Result, ServiceError};

/// Run a BlockLib call on the blocking pool
///
/// Dropping the returned future does not stop the call; its result is discarded.
pub(crate) async fn blocking<T, F>(call: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> std::result::Result<T, StorageError> + Send + 'static,
{
    Ok(tokio::task::spawn_blocking(call).await??)
}

pub(crate) fn from_wire_paths(paths: Vec<OwnedObjectPath>) -> Result<Vec<ObjectPath>> {
    paths.into_iter().map(from_wire_path).collect()
}

pub(crate) fn from_wire_path(path: OwnedObjectPath) -> Result<ObjectPath> {
    ObjectPath::new(path.as_str())
        .map_err(|e| ServiceError::InvalidArgument(e.to_string()))
}

pub(crate) fn to_wire_path(path: &ObjectPath) -> Result<OwnedObjectPath> {
    OwnedObjectPath::try_from(path.as_str().to_string())
        .map_err(|e| ServiceError::InvariantViolation(format!("unexportable path {path}: {e}")))
}

/// Device file of a snapshot, falling back to `/dev/<sysname>`
pub(crate) fn device_file(device: &Device) -> String {
    device
        .device_file()
        .map(ToString::to_string)
        .unwrap_or_else(|| format!("/dev/{}", device.sysname()))
}
