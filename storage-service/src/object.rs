// SPDX-License-Identifier: GPL-3.0-only

//! Block and drive objects as the dispatcher tracks them
//!
//! A [`TypedObject`] is the daemon-side record behind one exported block or
//! drive path: the latest device snapshot(s) plus the interface instances the
//! attacher currently keeps on it. Module objects are tracked separately by
//! the claim registry because their shape is module-defined.

use std::collections::BTreeMap;
use std::sync::Arc;

use storage_types::{Device, ObjectPath, PropertyBag};

use crate::interface::InterfaceInstance;

#[derive(Debug, Clone)]
pub enum ObjectKind {
    Block {
        device: Arc<Device>,
        /// Drive object this block device belongs to, directly or via its parent
        drive: Option<ObjectPath>,
    },
    Drive {
        vpd: String,
        /// Member devices keyed by syspath
        devices: BTreeMap<String, Arc<Device>>,
    },
}

#[derive(Debug, Clone)]
pub struct TypedObject {
    pub path: ObjectPath,
    pub kind: ObjectKind,
    pub interfaces: BTreeMap<String, InterfaceInstance>,
}

impl TypedObject {
    pub fn block(device: Arc<Device>, drive: Option<ObjectPath>) -> Self {
        Self {
            path: block_path(&device),
            kind: ObjectKind::Block { device, drive },
            interfaces: BTreeMap::new(),
        }
    }

    pub fn drive(vpd: &str) -> Self {
        Self {
            path: ObjectPath::for_drive(vpd),
            kind: ObjectKind::Drive {
                vpd: vpd.to_string(),
                devices: BTreeMap::new(),
            },
            interfaces: BTreeMap::new(),
        }
    }

    /// Current snapshot of a block object
    pub fn device(&self) -> Option<&Arc<Device>> {
        match &self.kind {
            ObjectKind::Block { device, .. } => Some(device),
            ObjectKind::Drive { .. } => None,
        }
    }

    pub fn is_block(&self) -> bool {
        matches!(self.kind, ObjectKind::Block { .. })
    }

    pub fn is_drive(&self) -> bool {
        matches!(self.kind, ObjectKind::Drive { .. })
    }

    /// Property bags of every attached interface, as they are exported
    pub fn exported_interfaces(&self) -> BTreeMap<String, PropertyBag> {
        self.interfaces
            .iter()
            .map(|(tag, instance)| (tag.clone(), instance.properties.clone()))
            .collect()
    }
}

/// Exported path of the block object for `device`
pub fn block_path(device: &Device) -> ObjectPath {
    ObjectPath::for_block_device(device.device_file().unwrap_or_else(|| device.sysname()))
}
