// SPDX-License-Identifier: GPL-3.0-only

//! LVM2 module
//!
//! Physical volumes are grouped into one module object per volume group at
//! `/lvm/<vg>`. Logical volumes show up as device-mapper block devices and
//! get a `Block.LVM2` interface pointing back at their group.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use storage_contracts::LvmOps;
use storage_contracts::wire::options_from_wire;
use storage_macros::with_caller;
use storage_types::{
    CallerInfo, Device, ObjectPath, OptionBag, PropertyBag, UeventAction, VolumeGroupInfo,
    split_dm_name,
};
use tokio_util::sync::CancellationToken;
use zbus::message::Header as MessageHeader;
use zbus::zvariant::{OwnedObjectPath, OwnedValue};
use zbus::{Connection, interface};

use super::{blocking, device_file, from_wire_paths, to_wire_path};
use crate::auth::{actions, authorize};
use crate::core_interfaces::block_device_file;
use crate::dispatcher::DispatchItem;
use crate::error::{Result, ServiceError, WireError};
use crate::interface::{InterfaceEntry, InterfaceInstance};
use crate::module::{
    ClaimDecision, DaemonHandle, Housekeeping, Module, ModuleObject, ModuleSetup, ObjectFactory,
};
use crate::object::TypedObject;

pub const VOLUME_GROUP_INTERFACE: &str = "org.storaged.Storaged.VolumeGroup";
pub const BLOCK_LVM2_INTERFACE: &str = "org.storaged.Storaged.Block.LVM2";

const PV_FS_TYPE: &str = "LVM2_member";

/// `/org/storaged/Storaged/lvm/<vg>`
pub fn volume_group_path(name: &str) -> ObjectPath {
    ObjectPath::root().child("lvm").child(name)
}

pub struct Lvm2Module;

impl Module for Lvm2Module {
    fn id(&self) -> &'static str {
        "lvm2"
    }

    fn init(&self, daemon: &DaemonHandle) -> Result<ModuleSetup> {
        let manager = Arc::new(LvmManager::new(daemon.clone()));
        Ok(ModuleSetup::new(manager.clone())
            .with_block_entry(LogicalVolumeEntry)
            .with_factory(VolumeGroupFactory {
                lvm: daemon.blocklib.lvm.clone(),
            })
            .with_manager(LvmManagerIface { manager }))
    }
}

/// `Block.LVM2` on device-mapper devices backing a logical volume
pub struct LogicalVolumeEntry;

impl InterfaceEntry for LogicalVolumeEntry {
    fn type_tag(&self) -> &'static str {
        BLOCK_LVM2_INTERFACE
    }

    fn check(&self, object: &TypedObject) -> bool {
        object
            .device()
            .and_then(|device| device.dm_uuid())
            .is_some_and(|uuid| uuid.starts_with("LVM-"))
    }

    fn update(
        &self,
        object: &TypedObject,
        _action: Option<UeventAction>,
        instance: &mut InterfaceInstance,
    ) -> bool {
        let Some((vg, lv)) = object
            .device()
            .and_then(|device| device.dm_name())
            .and_then(split_dm_name)
        else {
            return false;
        };
        let group = volume_group_path(&vg);

        let mut bag = PropertyBag::new();
        bag.insert("LogicalVolume".into(), group.child(&lv).into());
        bag.insert("VolumeGroup".into(), group.into());
        instance.replace(bag)
    }
}

fn volume_group_bag(info: &VolumeGroupInfo) -> PropertyBag {
    let mut bag = PropertyBag::new();
    bag.insert("Name".into(), info.name.clone().into());
    bag.insert("UUID".into(), info.uuid.clone().into());
    bag.insert("Size".into(), info.size.into());
    bag.insert("FreeSize".into(), info.free.into());
    bag.insert("NumPhysicalVolumes".into(), info.pv_count.into());
    bag
}

/// Volume group a block device is a physical volume of
fn volume_group_of(lvm: &dyn LvmOps, device: &Device) -> Result<Option<String>> {
    if device.fs_type() != Some(PV_FS_TYPE) {
        return Ok(None);
    }
    Ok(lvm.pv_info(&device_file(device))?.vg_name)
}

pub struct VolumeGroupFactory {
    lvm: Arc<dyn LvmOps>,
}

impl ObjectFactory for VolumeGroupFactory {
    fn name(&self) -> &'static str {
        "volume-group"
    }

    fn create(&self, device: &Device) -> Result<Option<Box<dyn ModuleObject>>> {
        let Some(name) = volume_group_of(self.lvm.as_ref(), device)? else {
            return Ok(None);
        };
        let info = self.lvm.vg_info(&name)?;
        tracing::debug!("Volume group {name} found on {}", device.syspath());

        Ok(Some(Box::new(VolumeGroupObject {
            path: volume_group_path(&name),
            members: BTreeSet::from([device.syspath().to_string()]),
            refresh: Arc::new(VolumeGroupRefresh {
                name,
                lvm: self.lvm.clone(),
                info: Mutex::new(info),
            }),
        })))
    }
}

pub struct VolumeGroupObject {
    path: ObjectPath,
    members: BTreeSet<String>,
    refresh: Arc<VolumeGroupRefresh>,
}

impl ModuleObject for VolumeGroupObject {
    fn path(&self) -> &ObjectPath {
        &self.path
    }

    fn process_uevent(&mut self, action: UeventAction, device: &Device) -> Result<ClaimDecision> {
        let syspath = device.syspath();
        let member = action != UeventAction::Remove
            && volume_group_of(self.refresh.lvm.as_ref(), device)?.as_deref()
                == Some(self.refresh.name.as_str());

        if !member {
            self.members.remove(syspath);
            if !self.members.is_empty() {
                self.refresh.refresh()?;
            }
            return Ok(ClaimDecision::Release);
        }
        self.members.insert(syspath.to_string());
        self.refresh.refresh()?;
        Ok(ClaimDecision::Keep)
    }

    fn interfaces(&self) -> Vec<(&'static str, PropertyBag)> {
        let info = self.refresh.info.lock().unwrap_or_else(|e| e.into_inner());
        vec![(VOLUME_GROUP_INTERFACE, volume_group_bag(&info))]
    }

    fn housekeeping(&self) -> Option<Arc<dyn Housekeeping>> {
        Some(self.refresh.clone())
    }
}

/// Cached `vgs` output of one group, shared with the housekeeping worker
struct VolumeGroupRefresh {
    name: String,
    lvm: Arc<dyn LvmOps>,
    info: Mutex<VolumeGroupInfo>,
}

impl VolumeGroupRefresh {
    fn refresh(&self) -> Result<()> {
        let info = self.lvm.vg_info(&self.name)?;
        *self.info.lock().unwrap_or_else(|e| e.into_inner()) = info;
        Ok(())
    }
}

impl Housekeeping for VolumeGroupRefresh {
    fn housekeeping(&self, _secs_since_last: u64, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Ok(());
        }
        self.refresh()
    }
}

fn validate_vg_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name.starts_with('-')
        && name != "."
        && name != ".."
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'_' | b'.' | b'-'));
    if valid {
        Ok(())
    } else {
        Err(ServiceError::InvalidArgument(format!(
            "Invalid volume group name '{name}'"
        )))
    }
}

pub struct LvmManager {
    daemon: DaemonHandle,
}

impl LvmManager {
    pub fn new(daemon: DaemonHandle) -> Self {
        Self { daemon }
    }

    /// Create a volume group over `blocks` and return its object once published
    pub async fn volume_group_create(
        &self,
        caller: &CallerInfo,
        name: &str,
        blocks: &[ObjectPath],
        options: &OptionBag,
    ) -> Result<ObjectPath> {
        authorize(
            self.daemon.authority.as_ref(),
            caller,
            actions::MANAGE_LVM,
            options,
        )
        .await?;

        validate_vg_name(name)?;
        if blocks.is_empty() {
            return Err(ServiceError::InvalidArgument(
                "At least one block device is required".to_string(),
            ));
        }
        let devices = blocks
            .iter()
            .map(|path| block_device_file(&self.daemon.objects, path))
            .collect::<Result<Vec<_>>>()?;

        tracing::info!(
            "Creating volume group {name} on {} for UID {}",
            devices.join(", "),
            caller.uid
        );
        let lvm = self.daemon.blocklib.lvm.clone();
        let vg_name = name.to_string();
        blocking(move || lvm.vg_create(&vg_name, &devices)).await?;

        self.daemon
            .dispatch(DispatchItem::TriggerChange(blocks.to_vec()));

        let path = volume_group_path(name);
        self.daemon
            .objects
            .wait_for(|object| object.path == path, None)
            .await
            .map_err(|e| ServiceError::timeout("Error waiting for volume group object", e))?;
        Ok(path)
    }
}

#[derive(Clone)]
pub struct LvmManagerIface {
    manager: Arc<LvmManager>,
}

#[interface(name = "org.storaged.Storaged.Manager.LVM2")]
impl LvmManagerIface {
    /// Create a volume group from block devices
    ///
    /// Example:
    /// ```bash
    /// busctl call org.storaged.Storaged /org/storaged/Storaged/Manager \
    ///   org.storaged.Storaged.Manager.LVM2 \
    ///   VolumeGroupCreate saoa{sv} vg0 1 /org/storaged/Storaged/block_devices/sdb 0
    /// ```
    #[with_caller]
    async fn volume_group_create(
        &self,
        #[zbus(connection)] _connection: &Connection,
        #[zbus(header)] _header: MessageHeader<'_>,
        name: String,
        blocks: Vec<OwnedObjectPath>,
        options: HashMap<String, OwnedValue>,
    ) -> std::result::Result<OwnedObjectPath, WireError> {
        let blocks = from_wire_paths(blocks)?;
        let path = self
            .manager
            .volume_group_create(&caller, &name, &blocks, &options_from_wire(&options))
            .await?;
        Ok(to_wire_path(&path)?)
    }
}
