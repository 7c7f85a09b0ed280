// SPDX-License-Identifier: GPL-3.0-only

use storage_types::BcacheStats;

use crate::StorageError;

pub trait BcacheOps: Send + Sync {
    fn stats(&self, device: &str) -> Result<BcacheStats, StorageError>;

    /// Bind `cache_device` in front of `backing_device`, returning the new bcache device file
    fn create(&self, backing_device: &str, cache_device: &str) -> Result<String, StorageError>;
}
