// SPDX-License-Identifier: GPL-3.0-only

use storage_types::LoopInfo;

use crate::StorageError;

pub trait LoopOps: Send + Sync {
    fn info(&self, device: &str) -> Result<LoopInfo, StorageError>;
}
