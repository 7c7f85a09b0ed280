// SPDX-License-Identifier: GPL-3.0-only

use futures_util::stream::BoxStream;
use storage_types::{Device, Uevent};

use crate::StorageError;

/// Adapter over kernel device events and property queries
pub trait DeviceSource: Send + Sync {
    /// Snapshot every device currently present
    fn enumerate(&self) -> Result<Vec<Device>, StorageError>;

    /// Fresh snapshot of one device, `None` if it is gone
    fn lookup(&self, syspath: &str) -> Result<Option<Device>, StorageError>;

    /// Ask the kernel to re-announce a device with a `change` event
    fn trigger_change(&self, syspath: &str) -> Result<(), StorageError>;

    /// Ordered stream of live events; may only be taken once
    fn events(&self) -> Result<BoxStream<'static, Uevent>, StorageError>;
}
