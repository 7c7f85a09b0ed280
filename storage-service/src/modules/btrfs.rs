// SPDX-License-Identifier: GPL-3.0-only

//! BTRFS module
//!
//! Adds `Filesystem.BTRFS` to block objects carrying a btrfs filesystem and
//! serves `Manager.BTRFS` for creating new volumes.

use std::collections::HashMap;
use std::sync::Arc;

use storage_contracts::BtrfsOps;
use storage_macros::with_caller;
use storage_types::{BtrfsRaidLevel, CallerInfo, ObjectPath, OptionBag, PropertyBag, UeventAction};
use storage_contracts::wire::options_from_wire;
use zbus::message::Header as MessageHeader;
use zbus::zvariant::{OwnedObjectPath, OwnedValue};
use zbus::{Connection, interface};

use super::{blocking, device_file, from_wire_paths};
use crate::auth::{actions, authorize};
use crate::core_interfaces::block_device_file;
use crate::dispatcher::DispatchItem;
use crate::error::{Result, ServiceError, WireError};
use crate::interface::{InterfaceEntry, InterfaceInstance};
use crate::module::{DaemonHandle, Module, ModuleSetup};
use crate::object::TypedObject;

pub const FILESYSTEM_BTRFS_INTERFACE: &str = "org.storaged.Storaged.Filesystem.BTRFS";

pub struct BtrfsModule;

impl Module for BtrfsModule {
    fn id(&self) -> &'static str {
        "btrfs"
    }

    fn init(&self, daemon: &DaemonHandle) -> Result<ModuleSetup> {
        let manager = Arc::new(BtrfsManager::new(daemon.clone()));
        Ok(ModuleSetup::new(manager.clone())
            .with_block_entry(FilesystemEntry {
                btrfs: daemon.blocklib.btrfs.clone(),
            })
            .with_manager(BtrfsManagerIface { manager }))
    }
}

/// `Filesystem.BTRFS` on every block device whose filesystem is btrfs
pub struct FilesystemEntry {
    btrfs: Arc<dyn BtrfsOps>,
}

impl InterfaceEntry for FilesystemEntry {
    fn type_tag(&self) -> &'static str {
        FILESYSTEM_BTRFS_INTERFACE
    }

    fn check(&self, object: &TypedObject) -> bool {
        object
            .device()
            .is_some_and(|device| device.fs_type() == Some("btrfs"))
    }

    fn update(
        &self,
        object: &TypedObject,
        _action: Option<UeventAction>,
        instance: &mut InterfaceInstance,
    ) -> bool {
        let Some(device) = object.device() else {
            return false;
        };
        let file = device_file(device);
        let info = match self.btrfs.filesystem_info(&file) {
            Ok(info) => info,
            Err(e) => {
                tracing::warn!("Failed to read btrfs filesystem info of {file}: {e}");
                return false;
            }
        };

        let mut bag = PropertyBag::new();
        bag.insert("label".into(), info.label.into());
        bag.insert("uuid".into(), info.uuid.into());
        bag.insert("num_devices".into(), info.num_devices.into());
        bag.insert("used".into(), info.used.into());
        instance.replace(bag)
    }
}

fn parse_level(level: &str, what: &str) -> Result<Option<BtrfsRaidLevel>> {
    if level.is_empty() {
        return Ok(None);
    }
    BtrfsRaidLevel::parse(level)
        .map(Some)
        .ok_or_else(|| ServiceError::InvalidArgument(format!("Unknown {what} RAID level '{level}'")))
}

pub struct BtrfsManager {
    daemon: DaemonHandle,
}

impl BtrfsManager {
    pub fn new(daemon: DaemonHandle) -> Self {
        Self { daemon }
    }

    /// Create a filesystem spanning `blocks`
    pub async fn create_volume(
        &self,
        caller: &CallerInfo,
        blocks: &[ObjectPath],
        label: &str,
        data_level: &str,
        md_level: &str,
        options: &OptionBag,
    ) -> Result<()> {
        authorize(
            self.daemon.authority.as_ref(),
            caller,
            actions::MANAGE_BTRFS,
            options,
        )
        .await?;

        if blocks.is_empty() {
            return Err(ServiceError::InvalidArgument(
                "At least one block device is required".to_string(),
            ));
        }
        let data_level = parse_level(data_level, "data")?;
        let md_level = parse_level(md_level, "metadata")?;
        for level in [data_level, md_level].into_iter().flatten() {
            if blocks.len() < level.min_devices() {
                return Err(ServiceError::InvalidArgument(format!(
                    "{} needs at least {} devices, got {}",
                    level.as_str(),
                    level.min_devices(),
                    blocks.len()
                )));
            }
        }
        let devices = blocks
            .iter()
            .map(|path| block_device_file(&self.daemon.objects, path))
            .collect::<Result<Vec<_>>>()?;

        tracing::info!(
            "Creating btrfs volume on {} for UID {}",
            devices.join(", "),
            caller.uid
        );
        let btrfs = self.daemon.blocklib.btrfs.clone();
        let label = (!label.is_empty()).then(|| label.to_string());
        blocking(move || btrfs.create_volume(&devices, label.as_deref(), data_level, md_level))
            .await?;

        // mkfs does not create new kernel devices; have the members re-announced
        self.daemon
            .dispatch(DispatchItem::TriggerChange(blocks.to_vec()));
        Ok(())
    }
}

#[derive(Clone)]
pub struct BtrfsManagerIface {
    manager: Arc<BtrfsManager>,
}

#[interface(name = "org.storaged.Storaged.Manager.BTRFS")]
impl BtrfsManagerIface {
    /// Create a new BTRFS volume
    ///
    /// Example:
    /// ```bash
    /// busctl call org.storaged.Storaged /org/storaged/Storaged/Manager \
    ///   org.storaged.Storaged.Manager.BTRFS \
    ///   CreateVolume aosssa{sv} 2 /org/storaged/Storaged/block_devices/sdb \
    ///   /org/storaged/Storaged/block_devices/sdc "data" "raid1" "raid1" 0
    /// ```
    #[with_caller]
    async fn create_volume(
        &self,
        #[zbus(connection)] _connection: &Connection,
        #[zbus(header)] _header: MessageHeader<'_>,
        blocks: Vec<OwnedObjectPath>,
        label: String,
        data_level: String,
        md_level: String,
        options: HashMap<String, OwnedValue>,
    ) -> std::result::Result<(), WireError> {
        let blocks = from_wire_paths(blocks)?;
        self.manager
            .create_volume(
                &caller,
                &blocks,
                &label,
                &data_level,
                &md_level,
                &options_from_wire(&options),
            )
            .await?;
        Ok(())
    }
}
