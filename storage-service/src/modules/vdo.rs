// SPDX-License-Identifier: GPL-3.0-only

//! VDO module: status of device-mapper VDO volumes

use std::sync::Arc;

use storage_contracts::VdoOps;
use storage_types::{PropertyBag, UeventAction};

use crate::error::Result;
use crate::interface::{InterfaceEntry, InterfaceInstance};
use crate::module::{DaemonHandle, Module, ModuleSetup};
use crate::object::TypedObject;

pub const BLOCK_VDO_INTERFACE: &str = "org.storaged.Storaged.Block.VDO";

pub struct VdoModule;

impl Module for VdoModule {
    fn id(&self) -> &'static str {
        "vdo"
    }

    fn init(&self, daemon: &DaemonHandle) -> Result<ModuleSetup> {
        Ok(ModuleSetup::new(Arc::new(())).with_block_entry(VdoEntry {
            vdo: daemon.blocklib.vdo.clone(),
        }))
    }
}

pub struct VdoEntry {
    vdo: Arc<dyn VdoOps>,
}

impl InterfaceEntry for VdoEntry {
    fn type_tag(&self) -> &'static str {
        BLOCK_VDO_INTERFACE
    }

    fn check(&self, object: &TypedObject) -> bool {
        object
            .device()
            .and_then(|device| device.dm_uuid())
            .is_some_and(|uuid| uuid.starts_with("VDO-"))
    }

    fn update(
        &self,
        object: &TypedObject,
        _action: Option<UeventAction>,
        instance: &mut InterfaceInstance,
    ) -> bool {
        let Some(name) = object.device().and_then(|device| device.dm_name()) else {
            return false;
        };
        let info = match self.vdo.info(name) {
            Ok(info) => info,
            Err(e) => {
                tracing::warn!("Failed to read VDO status of {name}: {e}");
                return false;
            }
        };

        let mut bag = PropertyBag::new();
        bag.insert("Name".into(), info.name.into());
        bag.insert("OperatingMode".into(), info.operating_mode.into());
        bag.insert("CompressionState".into(), info.compression_state.into());
        bag.insert("IndexState".into(), info.index_state.into());
        bag.insert("UsedSize".into(), info.used_size.into());
        bag.insert("LogicalSize".into(), info.logical_size.into());
        bag.insert("PhysicalSize".into(), info.physical_size.into());
        bag.insert("Compression".into(), info.compression.into());
        bag.insert("Deduplication".into(), info.deduplication.into());
        instance.replace(bag)
    }
}

#[cfg(test)]
mod tests {
    use storage_contracts::StorageError;
    use storage_types::{Device, PropertyValue, VdoInfo};

    use super::*;
    use crate::attacher::sync_interfaces;

    struct FakeVdo;

    impl VdoOps for FakeVdo {
        fn info(&self, name: &str) -> std::result::Result<VdoInfo, StorageError> {
            if name != "vdo0" {
                return Err(StorageError::failed(format!("{name} is not a VDO volume")));
            }
            Ok(VdoInfo {
                name: name.to_string(),
                operating_mode: "normal".to_string(),
                compression: true,
                ..Default::default()
            })
        }
    }

    fn entries() -> Vec<Arc<dyn InterfaceEntry>> {
        vec![Arc::new(VdoEntry {
            vdo: Arc::new(FakeVdo),
        })]
    }

    fn mapper(name: &str, uuid: &str) -> Device {
        Device::builder("/sys/devices/virtual/block/dm-3")
            .device_file("/dev/dm-3")
            .property("DM_NAME", name)
            .property("DM_UUID", uuid)
            .build()
    }

    #[test]
    fn vdo_volumes_get_status() {
        let mut object = TypedObject::block(Arc::new(mapper("vdo0", "VDO-1b2c")), None);
        sync_interfaces(&mut object, Some(UeventAction::Add), &entries());
        let bag = &object.interfaces[BLOCK_VDO_INTERFACE].properties;
        assert_eq!(bag["OperatingMode"], PropertyValue::from("normal"));
        assert_eq!(bag["Compression"], PropertyValue::Bool(true));
    }

    #[test]
    fn other_mapper_devices_are_skipped() {
        let mut object = TypedObject::block(Arc::new(mapper("vg0-root", "LVM-abc")), None);
        sync_interfaces(&mut object, Some(UeventAction::Add), &entries());
        assert!(object.interfaces.is_empty());
    }
}
