// SPDX-License-Identifier: GPL-3.0-only

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use storage_contracts::{
    BcacheOps, BlockLib, BtrfsOps, IscsiOps, LoopOps, LvmOps, StorageError, VdoOps, ZramOps,
};
use storage_types::{
    BcacheStats, BtrfsInfo, BtrfsRaidLevel, IscsiNode, IscsiSessionInfo, LoopInfo,
    PhysicalVolumeInfo, Uevent, VdoInfo, VolumeGroupInfo, ZramStats,
};

use super::ChannelDeviceSource;
use crate::fixtures;

type OpResult<T> = Result<T, StorageError>;

#[derive(Default)]
struct State {
    btrfs: HashMap<String, BtrfsInfo>,
    physical_volumes: HashMap<String, String>,
    volume_groups: HashMap<String, VolumeGroupInfo>,
    loops: HashMap<String, String>,
    targets: Vec<IscsiNode>,
    zram_devices: u32,
}

/// Block library over in-memory state
///
/// Operations that create kernel devices announce them on the device source
/// after `device_delay`, the way udev would.
pub struct FakeBlockLib {
    state: Mutex<State>,
    calls: Mutex<Vec<String>>,
    source: Arc<ChannelDeviceSource>,
    device_delay: Mutex<Duration>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl FakeBlockLib {
    pub fn new(source: Arc<ChannelDeviceSource>) -> Self {
        Self {
            state: Mutex::new(State::default()),
            calls: Mutex::new(Vec::new()),
            source,
            device_delay: Mutex::new(Duration::ZERO),
        }
    }

    pub fn blocklib(self: &Arc<Self>) -> BlockLib {
        BlockLib {
            btrfs: self.clone(),
            zram: self.clone(),
            lvm: self.clone(),
            bcache: self.clone(),
            vdo: self.clone(),
            iscsi: self.clone(),
            loops: self.clone(),
        }
    }

    /// Delay before created devices show up on the device source
    pub fn set_device_delay(&self, delay: Duration) {
        *lock(&self.device_delay) = delay;
    }

    pub fn set_btrfs(&self, device: &str, info: BtrfsInfo) {
        lock(&self.state).btrfs.insert(device.to_string(), info);
    }

    pub fn set_btrfs_label(&self, device: &str, label: &str) {
        lock(&self.state)
            .btrfs
            .entry(device.to_string())
            .or_default()
            .label = label.to_string();
    }

    pub fn set_physical_volume(&self, device: &str, vg_name: &str) {
        lock(&self.state)
            .physical_volumes
            .insert(device.to_string(), vg_name.to_string());
    }

    pub fn set_loop_backing(&self, device: &str, backing_file: &str) {
        lock(&self.state)
            .loops
            .insert(device.to_string(), backing_file.to_string());
    }

    pub fn add_target(&self, node: IscsiNode) {
        lock(&self.state).targets.push(node);
    }

    /// Every mutating call, as `"op arg..."`
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    fn record(&self, call: String) {
        tracing::debug!("fake blocklib: {call}");
        lock(&self.calls).push(call);
    }

    fn announce(&self, event: Uevent) {
        let delay = *lock(&self.device_delay);
        if delay.is_zero() {
            self.source.emit(event);
        } else {
            self.source.emit_after(delay, event);
        }
    }
}

impl BtrfsOps for FakeBlockLib {
    fn filesystem_info(&self, device: &str) -> OpResult<BtrfsInfo> {
        lock(&self.state)
            .btrfs
            .get(device)
            .cloned()
            .ok_or_else(|| StorageError::failed(format!("{device} is not a btrfs filesystem")))
    }

    fn create_volume(
        &self,
        devices: &[String],
        label: Option<&str>,
        data_level: Option<BtrfsRaidLevel>,
        md_level: Option<BtrfsRaidLevel>,
    ) -> OpResult<()> {
        self.record(format!(
            "mkfs.btrfs {} label={label:?} data={data_level:?} metadata={md_level:?}",
            devices.join(" ")
        ));
        let mut state = lock(&self.state);
        for device in devices {
            state.btrfs.insert(
                device.clone(),
                BtrfsInfo {
                    label: label.unwrap_or_default().to_string(),
                    num_devices: devices.len() as u64,
                    ..Default::default()
                },
            );
        }
        Ok(())
    }
}

impl ZramOps for FakeBlockLib {
    fn create_devices(&self, sizes: &[u64], num_streams: &[u64]) -> OpResult<()> {
        self.record(format!("zram create {sizes:?} streams={num_streams:?}"));
        lock(&self.state).zram_devices = sizes.len() as u32;
        for (index, size) in (0u32..).zip(sizes) {
            self.announce(Uevent::add(fixtures::zram(index, *size)));
        }
        Ok(())
    }

    fn destroy_devices(&self) -> OpResult<()> {
        self.record("zram destroy".to_string());
        let count = std::mem::take(&mut lock(&self.state).zram_devices);
        for index in 0..count {
            self.announce(Uevent::remove(fixtures::zram(index, 0)));
        }
        Ok(())
    }

    fn stats(&self, _device: &str) -> OpResult<ZramStats> {
        Ok(ZramStats {
            comp_algorithm: "lzo-rle".to_string(),
            max_comp_streams: 1,
            ..Default::default()
        })
    }
}

impl LvmOps for FakeBlockLib {
    fn pv_info(&self, device: &str) -> OpResult<PhysicalVolumeInfo> {
        let vg_name = lock(&self.state).physical_volumes.get(device).cloned();
        Ok(PhysicalVolumeInfo {
            device: device.to_string(),
            vg_uuid: vg_name.as_ref().map(|name| format!("uuid-{name}")),
            vg_name,
        })
    }

    fn vg_info(&self, vg_name: &str) -> OpResult<VolumeGroupInfo> {
        let state = lock(&self.state);
        if let Some(info) = state.volume_groups.get(vg_name) {
            return Ok(info.clone());
        }
        let members = state
            .physical_volumes
            .values()
            .filter(|name| name.as_str() == vg_name)
            .count();
        if members == 0 {
            return Err(StorageError::failed(format!(
                "Volume group \"{vg_name}\" not found"
            )));
        }
        Ok(VolumeGroupInfo {
            name: vg_name.to_string(),
            uuid: format!("uuid-{vg_name}"),
            pv_count: members as u32,
            ..Default::default()
        })
    }

    fn vg_create(&self, vg_name: &str, devices: &[String]) -> OpResult<()> {
        self.record(format!("vgcreate {vg_name} {}", devices.join(" ")));
        let mut state = lock(&self.state);
        for device in devices {
            state
                .physical_volumes
                .insert(device.clone(), vg_name.to_string());
        }
        Ok(())
    }
}

impl BcacheOps for FakeBlockLib {
    fn stats(&self, _device: &str) -> OpResult<BcacheStats> {
        Ok(BcacheStats {
            state: "clean".to_string(),
            mode: "writethrough".to_string(),
            ..Default::default()
        })
    }

    fn create(&self, backing_device: &str, cache_device: &str) -> OpResult<String> {
        self.record(format!("make-bcache -B {backing_device} -C {cache_device}"));
        Ok("/dev/bcache0".to_string())
    }
}

impl VdoOps for FakeBlockLib {
    fn info(&self, name: &str) -> OpResult<VdoInfo> {
        Ok(VdoInfo {
            name: name.to_string(),
            operating_mode: "normal".to_string(),
            ..Default::default()
        })
    }
}

impl IscsiOps for FakeBlockLib {
    fn initiator_name(&self) -> OpResult<String> {
        Ok("iqn.1994-05.com.example:storaged-test".to_string())
    }

    fn discover_send_targets(&self, address: &str, port: u16) -> OpResult<Vec<IscsiNode>> {
        self.record(format!("iscsiadm discovery {address}:{port}"));
        Ok(lock(&self.state)
            .targets
            .iter()
            .filter(|node| node.address == address)
            .cloned()
            .collect())
    }

    fn login(&self, node: &IscsiNode) -> OpResult<()> {
        self.record(format!("iscsiadm login {}", node.name));
        Ok(())
    }

    fn logout(&self, node: &IscsiNode) -> OpResult<()> {
        self.record(format!("iscsiadm logout {}", node.name));
        Ok(())
    }

    fn session_info(&self, session_id: &str) -> OpResult<IscsiSessionInfo> {
        Ok(IscsiSessionInfo {
            session_id: session_id.to_string(),
            ..Default::default()
        })
    }
}

impl LoopOps for FakeBlockLib {
    fn info(&self, device: &str) -> OpResult<LoopInfo> {
        Ok(LoopInfo {
            device: device.to_string(),
            backing_file: lock(&self.state).loops.get(device).cloned(),
            autoclear: false,
        })
    }
}
