// SPDX-License-Identifier: GPL-3.0-only

//! Block device snapshots from sysfs and the udev database

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};
use storage_contracts::{DeviceSource, StorageError};
use storage_types::{Device, Uevent, UeventAction};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::uevent_monitor::UeventMonitor;
use crate::{Result, SysError};

/// Sysfs attributes captured into every snapshot, relative to the device directory
const SNAPSHOT_ATTRIBUTES: &[&str] = &[
    "size",
    "ro",
    "removable",
    "queue/rotational",
    "loop/backing_file",
    "loop/autoclear",
    "dm/name",
    "dm/uuid",
    "device/vendor",
    "device/model",
    "device/rev",
];

/// Reads device snapshots below a sysfs root and a udev database directory
#[derive(Debug, Clone)]
pub struct DeviceReader {
    sys_root: PathBuf,
    udev_db: PathBuf,
}

impl Default for DeviceReader {
    fn default() -> Self {
        Self::new("/sys", "/run/udev/data")
    }
}

impl DeviceReader {
    pub fn new(sys_root: impl Into<PathBuf>, udev_db: impl Into<PathBuf>) -> Self {
        Self {
            sys_root: sys_root.into(),
            udev_db: udev_db.into(),
        }
    }

    /// Every block device listed under `class/block`
    pub fn enumerate(&self) -> Result<Vec<Device>> {
        let class_dir = self.sys_root.join("class").join("block");
        let mut devices = Vec::new();
        for entry in fs::read_dir(&class_dir)? {
            let entry = entry?;
            let syspath = match fs::canonicalize(entry.path()) {
                Ok(path) => path,
                Err(e) => {
                    warn!("Skipping {}: {e}", entry.path().display());
                    continue;
                }
            };
            match self.read(&syspath) {
                Ok(Some(device)) => devices.push(device),
                Ok(None) => {}
                Err(e) => warn!("Failed to read {}: {e}", syspath.display()),
            }
        }
        devices.sort_by(|a, b| a.syspath().cmp(b.syspath()));
        Ok(devices)
    }

    /// Snapshot of the device at `syspath`, `None` if it no longer exists
    pub fn read(&self, syspath: &Path) -> Result<Option<Device>> {
        let uevent = match fs::read_to_string(syspath.join("uevent")) {
            Ok(contents) => parse_uevent_file(&contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut builder = Device::builder(syspath.to_string_lossy());
        if let Some(devtype) = uevent.get("DEVTYPE") {
            builder = builder.devtype(devtype);
        }
        if let Some(devname) = uevent.get("DEVNAME") {
            builder = builder.device_file(format!("/dev/{devname}"));
        }
        if syspath.join("partition").exists()
            && let Some(parent) = syspath.parent()
        {
            builder = builder.parent(parent.to_string_lossy());
        }
        for (key, value) in &uevent {
            builder = builder.property(key, value);
        }

        if let (Some(major), Some(minor)) = (uevent.get("MAJOR"), uevent.get("MINOR")) {
            let db_file = self.udev_db.join(format!("b{major}:{minor}"));
            if let Ok(contents) = fs::read_to_string(&db_file) {
                let record = parse_udev_db(&contents);
                for link in record.symlinks {
                    builder = builder.symlink(format!("/dev/{link}"));
                }
                for (key, value) in record.properties {
                    builder = builder.property(key, value);
                }
            }
        }

        for attribute in SNAPSHOT_ATTRIBUTES {
            if let Ok(value) = fs::read_to_string(syspath.join(attribute)) {
                builder = builder.attribute(*attribute, value.trim());
            }
        }

        Ok(Some(builder.build()))
    }

    /// Turn a monitor message into an event, reading attributes from sysfs
    /// unless the device is already gone
    pub(crate) fn event_from_message(&self, message: &BTreeMap<String, String>) -> Option<Uevent> {
        let action: UeventAction = message.get("ACTION")?.parse().ok()?;
        let syspath = format!("{}{}", self.sys_root.display(), message.get("DEVPATH")?);

        if action != UeventAction::Remove {
            match self.read(Path::new(&syspath)) {
                Ok(Some(device)) => return Some(Uevent::new(action, device)),
                Ok(None) => debug!("{syspath} vanished before it could be read"),
                Err(e) => warn!("Failed to read {syspath}: {e}"),
            }
        }

        let mut builder = Device::builder(&syspath);
        if let Some(devtype) = message.get("DEVTYPE") {
            builder = builder.devtype(devtype);
        }
        if let Some(devname) = message.get("DEVNAME") {
            let devname = if devname.starts_with('/') {
                devname.clone()
            } else {
                format!("/dev/{devname}")
            };
            builder = builder.device_file(devname);
        }
        if message.get("DEVTYPE").map(String::as_str) == Some("partition")
            && let Some((parent, _)) = syspath.rsplit_once('/')
        {
            builder = builder.parent(parent);
        }
        for link in message
            .get("DEVLINKS")
            .map(|links| links.split_whitespace())
            .into_iter()
            .flatten()
        {
            builder = builder.symlink(link);
        }
        for (key, value) in message {
            builder = builder.property(key, value);
        }
        Some(Uevent::new(action, builder.build()))
    }
}

/// `KEY=VALUE` lines of a sysfs `uevent` file
pub fn parse_uevent_file(contents: &str) -> BTreeMap<String, String> {
    contents
        .lines()
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect()
}

/// Parsed udev database record
#[derive(Debug, Default, PartialEq, Eq)]
pub struct UdevRecord {
    /// Symlinks relative to `/dev`
    pub symlinks: Vec<String>,
    pub properties: Vec<(String, String)>,
}

pub fn parse_udev_db(contents: &str) -> UdevRecord {
    let mut record = UdevRecord::default();
    for line in contents.lines() {
        if let Some(link) = line.strip_prefix("S:") {
            record.symlinks.push(link.to_string());
        } else if let Some(property) = line.strip_prefix("E:")
            && let Some((key, value)) = property.split_once('=')
        {
            record.properties.push((key.to_string(), value.to_string()));
        }
    }
    record
}

/// [`DeviceSource`] backed by sysfs, the udev database and the udev netlink monitor
pub struct SysfsDeviceSource {
    reader: DeviceReader,
    monitor: Mutex<Option<UeventMonitor>>,
}

impl SysfsDeviceSource {
    /// Open the monitor socket first so no event between enumeration and
    /// streaming is lost
    pub fn new() -> Result<Self> {
        let monitor = UeventMonitor::open()?;
        Ok(Self {
            reader: DeviceReader::default(),
            monitor: Mutex::new(Some(monitor)),
        })
    }

    pub fn reader(&self) -> &DeviceReader {
        &self.reader
    }
}

impl DeviceSource for SysfsDeviceSource {
    fn enumerate(&self) -> std::result::Result<Vec<Device>, StorageError> {
        Ok(self.reader.enumerate()?)
    }

    fn lookup(&self, syspath: &str) -> std::result::Result<Option<Device>, StorageError> {
        Ok(self.reader.read(Path::new(syspath))?)
    }

    fn trigger_change(&self, syspath: &str) -> std::result::Result<(), StorageError> {
        fs::write(Path::new(syspath).join("uevent"), "change")
            .map_err(SysError::from)
            .map_err(StorageError::from)
    }

    fn events(&self) -> std::result::Result<BoxStream<'static, Uevent>, StorageError> {
        let monitor = self
            .monitor
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or_else(|| StorageError::failed("Device event stream was already taken"))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let reader = self.reader.clone();
        std::thread::Builder::new()
            .name("uevent-monitor".to_string())
            .spawn(move || {
                loop {
                    let message = match monitor.receive() {
                        Ok(Some(message)) => message,
                        Ok(None) => continue,
                        Err(e) => {
                            error!("Device monitor stopped: {e}");
                            return;
                        }
                    };
                    if message.get("SUBSYSTEM").map(String::as_str) != Some("block") {
                        continue;
                    }
                    if let Some(event) = reader.event_from_message(&message)
                        && tx.send(event).is_err()
                    {
                        return;
                    }
                }
            })
            .map_err(SysError::from)?;

        Ok(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        })
        .boxed())
    }
}
