// SPDX-License-Identifier: GPL-3.0-only

//! Stand-ins for the daemon's collaborators in unit tests

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use storage_contracts::{
    Authority, AuthorizationResult, BcacheOps, BlockLib, BtrfsOps, DeviceSource, IscsiOps,
    LoopOps, LvmOps, StorageError, VdoOps, ZramOps,
};
use storage_types::{
    BcacheStats, BtrfsInfo, BtrfsRaidLevel, CallerInfo, Device, IscsiNode, IscsiSessionInfo,
    LoopInfo, PhysicalVolumeInfo, Uevent, VdoInfo, VolumeGroupInfo, ZramStats,
};
use tokio::sync::mpsc;

use crate::config::DaemonConfig;
use crate::error::Result;
use crate::module::{DaemonHandle, Module, ModuleDescriptor, ModuleSetup};
use crate::object_manager::ObjectManager;

pub struct StubSource {
    devices: Mutex<Vec<Device>>,
    triggered: Mutex<Vec<String>>,
}

impl StubSource {
    pub fn new(devices: Vec<Device>) -> Self {
        Self {
            devices: Mutex::new(devices),
            triggered: Mutex::new(Vec::new()),
        }
    }

    pub fn set_devices(&self, devices: Vec<Device>) {
        *self.devices.lock().unwrap() = devices;
    }

    pub fn triggered(&self) -> Vec<String> {
        self.triggered.lock().unwrap().clone()
    }
}

impl DeviceSource for StubSource {
    fn enumerate(&self) -> std::result::Result<Vec<Device>, StorageError> {
        Ok(self.devices.lock().unwrap().clone())
    }

    fn lookup(&self, syspath: &str) -> std::result::Result<Option<Device>, StorageError> {
        Ok(self
            .devices
            .lock()
            .unwrap()
            .iter()
            .find(|device| device.syspath() == syspath)
            .cloned())
    }

    fn trigger_change(&self, syspath: &str) -> std::result::Result<(), StorageError> {
        self.triggered.lock().unwrap().push(syspath.to_string());
        Ok(())
    }

    fn events(&self) -> std::result::Result<BoxStream<'static, Uevent>, StorageError> {
        Ok(futures_util::stream::empty().boxed())
    }
}

/// Every operation fails with NotSupported
pub struct Unsupported;

fn unsupported<T>() -> std::result::Result<T, StorageError> {
    Err(StorageError::not_supported("not available in tests"))
}

impl BtrfsOps for Unsupported {
    fn filesystem_info(&self, _device: &str) -> std::result::Result<BtrfsInfo, StorageError> {
        unsupported()
    }

    fn create_volume(
        &self,
        _devices: &[String],
        _label: Option<&str>,
        _data_level: Option<BtrfsRaidLevel>,
        _md_level: Option<BtrfsRaidLevel>,
    ) -> std::result::Result<(), StorageError> {
        unsupported()
    }
}

impl ZramOps for Unsupported {
    fn create_devices(&self, _sizes: &[u64], _num_streams: &[u64]) -> std::result::Result<(), StorageError> {
        unsupported()
    }

    fn destroy_devices(&self) -> std::result::Result<(), StorageError> {
        unsupported()
    }

    fn stats(&self, _device: &str) -> std::result::Result<ZramStats, StorageError> {
        unsupported()
    }
}

impl LvmOps for Unsupported {
    fn pv_info(&self, _device: &str) -> std::result::Result<PhysicalVolumeInfo, StorageError> {
        unsupported()
    }

    fn vg_info(&self, _vg_name: &str) -> std::result::Result<VolumeGroupInfo, StorageError> {
        unsupported()
    }

    fn vg_create(&self, _vg_name: &str, _devices: &[String]) -> std::result::Result<(), StorageError> {
        unsupported()
    }
}

impl BcacheOps for Unsupported {
    fn stats(&self, _device: &str) -> std::result::Result<BcacheStats, StorageError> {
        unsupported()
    }

    fn create(&self, _backing: &str, _cache: &str) -> std::result::Result<String, StorageError> {
        unsupported()
    }
}

impl VdoOps for Unsupported {
    fn info(&self, _name: &str) -> std::result::Result<VdoInfo, StorageError> {
        unsupported()
    }
}

impl IscsiOps for Unsupported {
    fn initiator_name(&self) -> std::result::Result<String, StorageError> {
        unsupported()
    }

    fn discover_send_targets(
        &self,
        _address: &str,
        _port: u16,
    ) -> std::result::Result<Vec<IscsiNode>, StorageError> {
        unsupported()
    }

    fn login(&self, _node: &IscsiNode) -> std::result::Result<(), StorageError> {
        unsupported()
    }

    fn logout(&self, _node: &IscsiNode) -> std::result::Result<(), StorageError> {
        unsupported()
    }

    fn session_info(&self, _session_id: &str) -> std::result::Result<IscsiSessionInfo, StorageError> {
        unsupported()
    }
}

impl LoopOps for Unsupported {
    fn info(&self, _device: &str) -> std::result::Result<LoopInfo, StorageError> {
        unsupported()
    }
}

pub fn unsupported_blocklib() -> BlockLib {
    let ops = Arc::new(Unsupported);
    BlockLib {
        btrfs: ops.clone(),
        zram: ops.clone(),
        lvm: ops.clone(),
        bcache: ops.clone(),
        vdo: ops.clone(),
        iscsi: ops.clone(),
        loops: ops,
    }
}

pub struct AllowAll;

#[async_trait]
impl Authority for AllowAll {
    async fn check(
        &self,
        _caller: &CallerInfo,
        _action_id: &str,
        _allow_user_interaction: bool,
    ) -> std::result::Result<AuthorizationResult, StorageError> {
        Ok(AuthorizationResult::Authorized)
    }
}

pub fn daemon_handle() -> DaemonHandle {
    daemon_with(unsupported_blocklib(), DaemonConfig::default())
}

/// Daemon handle over a fresh object manager with the given collaborators
pub fn daemon_with(blocklib: BlockLib, config: DaemonConfig) -> DaemonHandle {
    let (dispatch, _) = mpsc::unbounded_channel();
    DaemonHandle::new(
        Arc::new(ObjectManager::default()),
        blocklib,
        Arc::new(AllowAll),
        Arc::new(StubSource::new(Vec::new())),
        Arc::new(config),
        dispatch,
    )
}

pub fn root_caller() -> CallerInfo {
    CallerInfo::new(0, 1, Some("root".to_string()), ":1.1")
}

struct NullModule(&'static str);

impl Module for NullModule {
    fn id(&self) -> &'static str {
        self.0
    }

    fn init(&self, _daemon: &DaemonHandle) -> Result<ModuleSetup> {
        Ok(ModuleSetup::new(Arc::new(())))
    }
}

/// A loaded-module record built straight from a setup
pub fn descriptor(id: &'static str, setup: ModuleSetup) -> Arc<ModuleDescriptor> {
    Arc::new(ModuleDescriptor::new(id.to_string(), Arc::new(NullModule(id)), setup))
}
