// SPDX-License-Identifier: GPL-3.0-only

use storage_types::{PhysicalVolumeInfo, VolumeGroupInfo};

use crate::StorageError;

pub trait LvmOps: Send + Sync {
    fn pv_info(&self, device: &str) -> Result<PhysicalVolumeInfo, StorageError>;

    fn vg_info(&self, vg_name: &str) -> Result<VolumeGroupInfo, StorageError>;

    fn vg_create(&self, vg_name: &str, devices: &[String]) -> Result<(), StorageError>;
}
