// SPDX-License-Identifier: GPL-3.0-only

use storage_types::ZramStats;

use crate::StorageError;

pub trait ZramOps: Send + Sync {
    /// Load the zram kernel module with one device per entry of `sizes`
    fn create_devices(&self, sizes: &[u64], num_streams: &[u64]) -> Result<(), StorageError>;

    /// Unload the zram kernel module, removing every zram device
    fn destroy_devices(&self) -> Result<(), StorageError>;

    fn stats(&self, device: &str) -> Result<ZramStats, StorageError>;
}
