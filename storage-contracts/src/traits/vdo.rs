// SPDX-License-Identifier: GPL-3.0-only

use storage_types::VdoInfo;

use crate::StorageError;

pub trait VdoOps: Send + Sync {
    /// Status of the VDO volume exposed under device-mapper name `name`
    fn info(&self, name: &str) -> Result<VdoInfo, StorageError>;
}
