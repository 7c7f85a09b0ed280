// SPDX-License-Identifier: GPL-3.0-only

//! Kernel device snapshots
//!
//! A [`Device`] captures one kernel device as it looked when an event was
//! delivered: its sysfs path, device node, udev symlinks, udev properties and
//! the handful of sysfs attributes the daemon reads. A new snapshot is built
//! for every event and never mutated afterwards.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Immutable snapshot of one kernel device at one event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    syspath: String,
    subsystem: String,
    devtype: Option<String>,
    device_file: Option<String>,
    symlinks: Vec<String>,
    parent: Option<String>,
    properties: BTreeMap<String, String>,
    attributes: BTreeMap<String, String>,
}

impl Device {
    pub fn builder(syspath: impl Into<String>) -> DeviceBuilder {
        DeviceBuilder::new(syspath)
    }

    /// Unique identifier of the device (e.g. `/sys/devices/.../block/sdb/sdb1`)
    pub fn syspath(&self) -> &str {
        &self.syspath
    }

    /// Last component of the syspath (e.g. `sdb1`)
    pub fn sysname(&self) -> &str {
        self.syspath.rsplit('/').next().unwrap_or(&self.syspath)
    }

    pub fn subsystem(&self) -> &str {
        &self.subsystem
    }

    pub fn is_block(&self) -> bool {
        self.subsystem == "block"
    }

    pub fn devtype(&self) -> Option<&str> {
        self.devtype.as_deref()
    }

    /// Whether this is a whole disk rather than a partition
    pub fn is_whole_disk(&self) -> bool {
        self.devtype.as_deref() == Some("disk")
    }

    /// Device node (e.g. `/dev/sdb1`)
    pub fn device_file(&self) -> Option<&str> {
        self.device_file.as_deref()
    }

    /// Alternative paths to the device node, in udev order
    pub fn symlinks(&self) -> &[String] {
        &self.symlinks
    }

    /// Syspath of the kernel parent device, if the parent is a device too
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn property_as_bool(&self, key: &str) -> bool {
        matches!(self.property(key), Some("1" | "true" | "yes" | "y"))
    }

    pub fn property_as_u64(&self, key: &str) -> Option<u64> {
        self.property(key).and_then(|value| value.trim().parse().ok())
    }

    /// Sysfs attribute captured with the snapshot (e.g. `size`, `ro`)
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn attribute_as_u64(&self, key: &str) -> Option<u64> {
        self.attribute(key).and_then(|value| value.trim().parse().ok())
    }

    pub fn attribute_as_bool(&self, key: &str) -> bool {
        self.attribute_as_u64(key).is_some_and(|value| value != 0)
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    pub fn fs_type(&self) -> Option<&str> {
        self.property("ID_FS_TYPE").filter(|value| !value.is_empty())
    }

    pub fn dm_name(&self) -> Option<&str> {
        self.property("DM_NAME")
    }

    pub fn dm_uuid(&self) -> Option<&str> {
        self.property("DM_UUID")
    }

    /// Size in bytes, derived from the 512-byte sector count in sysfs
    pub fn size_bytes(&self) -> u64 {
        self.attribute_as_u64("size").unwrap_or(0) * 512
    }

    /// Vital product identifier used to group block devices under one drive
    pub fn vpd(&self) -> Option<&str> {
        ["ID_WWN_WITH_EXTENSION", "ID_WWN", "ID_SERIAL"]
            .iter()
            .filter_map(|key| self.property(key))
            .find(|value| !value.is_empty())
    }
}

/// Builder for [`Device`] snapshots
#[derive(Debug, Clone)]
pub struct DeviceBuilder {
    device: Device,
}

impl DeviceBuilder {
    pub fn new(syspath: impl Into<String>) -> Self {
        Self {
            device: Device {
                syspath: syspath.into(),
                subsystem: "block".to_string(),
                devtype: None,
                device_file: None,
                symlinks: Vec::new(),
                parent: None,
                properties: BTreeMap::new(),
                attributes: BTreeMap::new(),
            },
        }
    }

    pub fn subsystem(mut self, subsystem: impl Into<String>) -> Self {
        self.device.subsystem = subsystem.into();
        self
    }

    pub fn devtype(mut self, devtype: impl Into<String>) -> Self {
        self.device.devtype = Some(devtype.into());
        self
    }

    pub fn device_file(mut self, device_file: impl Into<String>) -> Self {
        self.device.device_file = Some(device_file.into());
        self
    }

    pub fn symlink(mut self, symlink: impl Into<String>) -> Self {
        self.device.symlinks.push(symlink.into());
        self
    }

    pub fn parent(mut self, parent: impl Into<String>) -> Self {
        self.device.parent = Some(parent.into());
        self
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.device.properties.insert(key.into(), value.into());
        self
    }

    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.device.attributes.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> Device {
        self.device
    }
}
