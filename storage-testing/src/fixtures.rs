// SPDX-License-Identifier: GPL-3.0-only

//! Device snapshots the way sysfs and udev would describe them

use storage_types::{Device, DeviceBuilder};

/// Whole SCSI disk `sdX` with a serial, so it gets a drive object
pub fn disk(name: &str, serial: &str) -> Device {
    DeviceBuilder::new(format!("/sys/devices/pci0000:00/0000:00:1f.2/ata1/host0/target0:0:0/0:0:0:0/block/{name}"))
        .device_file(format!("/dev/{name}"))
        .devtype("disk")
        .property("ID_SERIAL", serial)
        .property("ID_MODEL", "QEMU_HARDDISK")
        .attribute("size", "16777216")
        .build()
}

/// Partition `sdXN` of `disk`, optionally carrying a filesystem
pub fn partition(disk: &Device, number: u32, fs_type: Option<&str>) -> Device {
    let name = format!("{}{number}", disk.sysname());
    let mut builder = DeviceBuilder::new(format!("{}/{name}", disk.syspath()))
        .device_file(format!("/dev/{name}"))
        .devtype("partition")
        .parent(disk.syspath())
        .attribute("size", "2097152");
    if let Some(fs_type) = fs_type {
        builder = builder
            .property("ID_FS_TYPE", fs_type)
            .property("ID_FS_USAGE", "filesystem");
    }
    builder.build()
}

/// Stand-alone block device `/sys/block/<name>` with the given filesystem type
pub fn block(name: &str, fs_type: &str) -> Device {
    DeviceBuilder::new(format!("/sys/block/{name}"))
        .device_file(format!("/dev/{name}"))
        .devtype("partition")
        .property("ID_FS_TYPE", fs_type)
        .property("ID_FS_USAGE", "filesystem")
        .build()
}

/// Loop device bound to `backing_file`
pub fn bound_loop(index: u32, backing_file: &str) -> Device {
    DeviceBuilder::new(format!("/sys/devices/virtual/block/loop{index}"))
        .device_file(format!("/dev/loop{index}"))
        .devtype("disk")
        .attribute("loop/backing_file", format!("{backing_file}\n"))
        .build()
}

pub fn zram(index: u32, size_bytes: u64) -> Device {
    DeviceBuilder::new(format!("/sys/devices/virtual/block/zram{index}"))
        .device_file(format!("/dev/zram{index}"))
        .devtype("disk")
        .attribute("disksize", size_bytes.to_string())
        .build()
}

/// Device the probe module groups under `/probe/<group>`
pub fn probed(name: &str, group: &str) -> Device {
    DeviceBuilder::new(format!("/sys/devices/virtual/block/{name}"))
        .device_file(format!("/dev/{name}"))
        .devtype("disk")
        .property("PROBE_GROUP", group)
        .build()
}

/// A probed device whose group keeps its object alive when it is removed
pub fn probed_retained(name: &str, group: &str) -> Device {
    DeviceBuilder::new(format!("/sys/devices/virtual/block/{name}"))
        .device_file(format!("/dev/{name}"))
        .devtype("disk")
        .property("PROBE_GROUP", group)
        .property("PROBE_RETAIN", "1")
        .build()
}
