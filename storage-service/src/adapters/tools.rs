// SPDX-License-Identifier: GPL-3.0-only

//! BlockLib over the storage-sys tool wrappers

use std::path::PathBuf;
use std::sync::Arc;

use storage_contracts::{
    BcacheOps, BlockLib, BtrfsOps, IscsiOps, LoopOps, LvmOps, StorageError, VdoOps, ZramOps,
};
use storage_sys::tools;
use storage_types::{
    BcacheStats, BtrfsInfo, BtrfsRaidLevel, IscsiNode, IscsiSessionInfo, LoopInfo,
    PhysicalVolumeInfo, VdoInfo, VolumeGroupInfo, ZramStats,
};

use crate::config::DaemonConfig;

type OpResult<T> = Result<T, StorageError>;

/// Runs every operation through the host's command-line tools and sysfs
pub struct ToolsBlockLib {
    initiator_name_file: PathBuf,
}

impl ToolsBlockLib {
    pub fn new(config: &DaemonConfig) -> Self {
        Self {
            initiator_name_file: config.iscsi.initiator_name_file.clone(),
        }
    }

    pub fn into_blocklib(self) -> BlockLib {
        let tools = Arc::new(self);
        BlockLib {
            btrfs: tools.clone(),
            zram: tools.clone(),
            lvm: tools.clone(),
            bcache: tools.clone(),
            vdo: tools.clone(),
            iscsi: tools.clone(),
            loops: tools,
        }
    }
}

impl BtrfsOps for ToolsBlockLib {
    fn filesystem_info(&self, device: &str) -> OpResult<BtrfsInfo> {
        Ok(tools::btrfs::filesystem_info(device)?)
    }

    fn create_volume(
        &self,
        devices: &[String],
        label: Option<&str>,
        data_level: Option<BtrfsRaidLevel>,
        md_level: Option<BtrfsRaidLevel>,
    ) -> OpResult<()> {
        Ok(tools::btrfs::create_volume(
            devices, label, data_level, md_level,
        )?)
    }
}

impl ZramOps for ToolsBlockLib {
    fn create_devices(&self, sizes: &[u64], num_streams: &[u64]) -> OpResult<()> {
        Ok(tools::zram::create_devices(sizes, num_streams)?)
    }

    fn destroy_devices(&self) -> OpResult<()> {
        Ok(tools::zram::destroy_devices()?)
    }

    fn stats(&self, device: &str) -> OpResult<ZramStats> {
        Ok(tools::zram::stats(device)?)
    }
}

impl LvmOps for ToolsBlockLib {
    fn pv_info(&self, device: &str) -> OpResult<PhysicalVolumeInfo> {
        Ok(tools::lvm::pv_info(device)?)
    }

    fn vg_info(&self, vg_name: &str) -> OpResult<VolumeGroupInfo> {
        Ok(tools::lvm::vg_info(vg_name)?)
    }

    fn vg_create(&self, vg_name: &str, devices: &[String]) -> OpResult<()> {
        Ok(tools::lvm::vg_create(vg_name, devices)?)
    }
}

impl BcacheOps for ToolsBlockLib {
    fn stats(&self, device: &str) -> OpResult<BcacheStats> {
        Ok(tools::bcache::stats(device)?)
    }

    fn create(&self, backing_device: &str, cache_device: &str) -> OpResult<String> {
        Ok(tools::bcache::create(backing_device, cache_device)?)
    }
}

impl VdoOps for ToolsBlockLib {
    fn info(&self, name: &str) -> OpResult<VdoInfo> {
        Ok(tools::vdo::info(name)?)
    }
}

impl IscsiOps for ToolsBlockLib {
    fn initiator_name(&self) -> OpResult<String> {
        Ok(tools::iscsi::initiator_name(&self.initiator_name_file)?)
    }

    fn discover_send_targets(&self, address: &str, port: u16) -> OpResult<Vec<IscsiNode>> {
        Ok(tools::iscsi::discover_send_targets(address, port)?)
    }

    fn login(&self, node: &IscsiNode) -> OpResult<()> {
        Ok(tools::iscsi::login(node)?)
    }

    fn logout(&self, node: &IscsiNode) -> OpResult<()> {
        Ok(tools::iscsi::logout(node)?)
    }

    fn session_info(&self, session_id: &str) -> OpResult<IscsiSessionInfo> {
        Ok(tools::iscsi::session_info(session_id)?)
    }
}

impl LoopOps for ToolsBlockLib {
    fn info(&self, device: &str) -> OpResult<LoopInfo> {
        Ok(tools::loops::info(device)?)
    }
}
