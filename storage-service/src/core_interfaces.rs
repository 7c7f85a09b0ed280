// SPDX-License-Identifier: GPL-3.0-only

//! Interfaces the core itself keeps on every block and drive object

use storage_types::{ObjectPath, PropertyBag, PropertyValue, UeventAction};

use crate::error::{Result, ServiceError};
use crate::interface::{InterfaceEntry, InterfaceInstance};
use crate::object::{ObjectKind, TypedObject, block_path};
use crate::object_manager::{ExportedObject, ObjectManager};

pub const BLOCK_INTERFACE: &str = "org.storaged.Storaged.Block";
pub const DRIVE_INTERFACE: &str = "org.storaged.Storaged.Drive";

/// Type tags no module may claim
pub const CORE_INTERFACES: &[&str] = &[BLOCK_INTERFACE, DRIVE_INTERFACE];

pub struct BlockEntry;

impl InterfaceEntry for BlockEntry {
    fn type_tag(&self) -> &'static str {
        BLOCK_INTERFACE
    }

    fn check(&self, object: &TypedObject) -> bool {
        object.is_block()
    }

    fn update(
        &self,
        object: &TypedObject,
        _action: Option<UeventAction>,
        instance: &mut InterfaceInstance,
    ) -> bool {
        let ObjectKind::Block { device, drive } = &object.kind else {
            return false;
        };

        let device_file = device
            .device_file()
            .map(ToString::to_string)
            .unwrap_or_else(|| format!("/dev/{}", device.sysname()));
        let preferred = match device.dm_name() {
            Some(name) if !name.is_empty() => format!("/dev/mapper/{name}"),
            _ => device_file.clone(),
        };
        let id = |key: &str| PropertyValue::from(device.property(key).unwrap_or_default());

        let mut bag = PropertyBag::new();
        bag.insert("Device".into(), device_file.into());
        bag.insert("PreferredDevice".into(), preferred.into());
        bag.insert("Symlinks".into(), device.symlinks().to_vec().into());
        bag.insert("Size".into(), device.size_bytes().into());
        bag.insert("ReadOnly".into(), device.attribute_as_bool("ro").into());
        bag.insert("IdUsage".into(), id("ID_FS_USAGE"));
        bag.insert("IdType".into(), id("ID_FS_TYPE"));
        bag.insert("IdVersion".into(), id("ID_FS_VERSION"));
        bag.insert("IdLabel".into(), id("ID_FS_LABEL"));
        bag.insert("IdUUID".into(), id("ID_FS_UUID"));
        bag.insert(
            "Drive".into(),
            drive.clone().unwrap_or_else(ObjectPath::none).into(),
        );
        instance.replace(bag)
    }
}

pub struct DriveEntry;

impl InterfaceEntry for DriveEntry {
    fn type_tag(&self) -> &'static str {
        DRIVE_INTERFACE
    }

    fn check(&self, object: &TypedObject) -> bool {
        object.is_drive()
    }

    fn update(
        &self,
        object: &TypedObject,
        _action: Option<UeventAction>,
        instance: &mut InterfaceInstance,
    ) -> bool {
        let ObjectKind::Drive { devices, .. } = &object.kind else {
            return false;
        };
        let Some(first) = devices.values().next() else {
            return false;
        };
        let text = |key: &str| PropertyValue::from(first.property(key).unwrap_or_default());
        let serial = first
            .property("ID_SERIAL_SHORT")
            .or_else(|| first.property("ID_SERIAL"))
            .unwrap_or_default();

        let mut bag = PropertyBag::new();
        bag.insert("Vendor".into(), text("ID_VENDOR"));
        bag.insert("Model".into(), text("ID_MODEL"));
        bag.insert("Revision".into(), text("ID_REVISION"));
        bag.insert("Serial".into(), serial.into());
        bag.insert("WWN".into(), text("ID_WWN"));
        bag.insert("Size".into(), first.size_bytes().into());
        bag.insert("Removable".into(), first.attribute_as_bool("removable").into());
        bag.insert(
            "Rotational".into(),
            first.attribute_as_bool("queue/rotational").into(),
        );
        bag.insert(
            "Devices".into(),
            devices
                .values()
                .map(|device| block_path(device))
                .collect::<Vec<_>>()
                .into(),
        );
        instance.replace(bag)
    }
}

fn block_string(object: &ExportedObject, name: &str) -> Option<String> {
    match object.interface(BLOCK_INTERFACE)?.get(name)? {
        PropertyValue::Str(value) => Some(value.clone()),
        _ => None,
    }
}

/// Device file of the block object at `path`
pub fn block_device_file(objects: &ObjectManager, path: &ObjectPath) -> Result<String> {
    let object = objects
        .get(path)
        .ok_or_else(|| ServiceError::DeviceLookup(format!("No object at path {path}")))?;
    block_string(&object, "Device")
        .ok_or_else(|| ServiceError::DeviceLookup(format!("Object {path} is not a block device")))
}

/// Block object whose device file, preferred device or any symlink is `file`
pub fn find_block_by_file(objects: &ObjectManager, file: &str) -> Option<ObjectPath> {
    objects.iter().into_iter().find_map(|object| {
        let block = object.interface(BLOCK_INTERFACE)?;
        let matches = ["Device", "PreferredDevice"]
            .iter()
            .any(|name| matches!(block.get(*name), Some(PropertyValue::Str(value)) if value == file))
            || matches!(block.get("Symlinks"), Some(PropertyValue::StrList(links)) if links.iter().any(|link| link == file));
        matches.then(|| object.path.clone())
    })
}

/// Block objects whose `property` equals `value`
pub fn find_blocks_by_property(objects: &ObjectManager, property: &str, value: &str) -> Vec<ObjectPath> {
    objects
        .iter()
        .into_iter()
        .filter(|object| block_string(object, property).as_deref() == Some(value))
        .map(|object| object.path.clone())
        .collect()
}
