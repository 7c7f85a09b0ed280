// SPDX-License-Identifier: GPL-3.0-only

use storage_types::{BtrfsInfo, BtrfsRaidLevel};

use crate::StorageError;

pub trait BtrfsOps: Send + Sync {
    /// Label, UUID and usage of the filesystem on `device`
    fn filesystem_info(&self, device: &str) -> Result<BtrfsInfo, StorageError>;

    fn create_volume(
        &self,
        devices: &[String],
        label: Option<&str>,
        data_level: Option<BtrfsRaidLevel>,
        md_level: Option<BtrfsRaidLevel>,
    ) -> Result<(), StorageError>;
}
