// SPDX-License-Identifier: GPL-3.0-only

//! Human-readable rendering of objects and signals

use std::fmt::Write;

use chrono::{DateTime, Local};
use storage_contracts::client::{BusSignal, ManagedObject};
use storage_types::PropertyBag;

use crate::BLOCK_INTERFACE;

/// Object whose block device file or one of whose symlinks is `file`
pub fn find_by_device<'a>(objects: &'a [ManagedObject], file: &str) -> Option<&'a ManagedObject> {
    objects.iter().find(|object| {
        let Some(block) = object.interfaces.get(BLOCK_INTERFACE) else {
            return false;
        };
        let device = block.get("Device").map(ToString::to_string);
        if device.as_deref() == Some(file) {
            return true;
        }
        matches!(
            block.get("Symlinks"),
            Some(storage_types::PropertyValue::StrList(links)) if links.iter().any(|link| link == file)
        )
    })
}

/// Object at `path`, accepting paths relative to the object root
pub fn find_by_path<'a>(objects: &'a [ManagedObject], path: &str) -> Option<&'a ManagedObject> {
    let wanted = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("{}/{path}", storage_types::OBJECT_ROOT)
    };
    objects.iter().find(|object| object.path == wanted)
}

fn render_properties(out: &mut String, properties: &PropertyBag, indent: usize) {
    let width = properties.keys().map(String::len).max().unwrap_or(0) + 1;
    for (name, value) in properties {
        let label = format!("{name}:");
        let _ = writeln!(out, "{:indent$}{label:<width$} {value}", "");
    }
}

pub fn render_object(object: &ManagedObject) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}:", object.path);
    for (interface, properties) in &object.interfaces {
        let _ = writeln!(out, "  {interface}:");
        render_properties(&mut out, properties, 4);
    }
    out
}

pub fn render_signal(signal: &BusSignal, at: DateTime<Local>) -> String {
    let stamp = at.format("%H:%M:%S%.3f");
    let mut out = String::new();
    match signal {
        BusSignal::InterfacesAdded { path, interfaces } => {
            for (interface, properties) in interfaces {
                let _ = writeln!(out, "{stamp}: {path}: Added interface {interface}");
                render_properties(&mut out, properties, 2);
            }
        }
        BusSignal::InterfacesRemoved { path, interfaces } => {
            for interface in interfaces {
                let _ = writeln!(out, "{stamp}: {path}: Removed interface {interface}");
            }
        }
        BusSignal::PropertiesChanged {
            path,
            interface,
            changed,
        } => {
            let _ = writeln!(out, "{stamp}: {path}: {interface}: Properties Changed");
            render_properties(&mut out, changed, 2);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::TimeZone;
    use storage_types::PropertyValue;

    use super::*;

    fn sda() -> ManagedObject {
        let mut block = PropertyBag::new();
        block.insert("Device".into(), "/dev/sda".into());
        block.insert(
            "Symlinks".into(),
            PropertyValue::StrList(vec!["/dev/disk/by-id/ata-QEMU_HARDDISK_QM00001".into()]),
        );
        block.insert("Size".into(), PropertyValue::U64(8_589_934_592));
        ManagedObject {
            path: "/org/storaged/Storaged/block_devices/sda".to_string(),
            interfaces: BTreeMap::from([(BLOCK_INTERFACE.to_string(), block)]),
        }
    }

    #[test]
    fn devices_resolve_by_file_or_symlink() {
        let objects = vec![sda()];
        assert!(find_by_device(&objects, "/dev/sda").is_some());
        assert!(find_by_device(&objects, "/dev/disk/by-id/ata-QEMU_HARDDISK_QM00001").is_some());
        assert!(find_by_device(&objects, "/dev/sdb").is_none());
    }

    #[test]
    fn relative_object_paths_are_accepted() {
        let objects = vec![sda()];
        assert!(find_by_path(&objects, "block_devices/sda").is_some());
        assert!(find_by_path(&objects, "/org/storaged/Storaged/block_devices/sda").is_some());
        assert!(find_by_path(&objects, "block_devices/sdb").is_none());
    }

    #[test]
    fn objects_render_aligned_properties() {
        let rendered = render_object(&sda());
        assert!(rendered.starts_with("/org/storaged/Storaged/block_devices/sda:\n"));
        assert!(rendered.contains("  org.storaged.Storaged.Block:\n"));
        assert!(rendered.contains("    Device:   /dev/sda\n"));
        assert!(rendered.contains("    Size:     8589934592\n"));
    }

    #[test]
    fn removals_are_stamped() {
        let at = Local.with_ymd_and_hms(2026, 3, 1, 12, 30, 5).unwrap();
        let rendered = render_signal(
            &BusSignal::InterfacesRemoved {
                path: "/org/storaged/Storaged/block_devices/zram0".to_string(),
                interfaces: vec!["org.storaged.Storaged.Block.ZRAM".to_string()],
            },
            at,
        );
        assert_eq!(
            rendered,
            "12:30:05.000: /org/storaged/Storaged/block_devices/zram0: Removed interface org.storaged.Storaged.Block.ZRAM\n"
        );
    }
}
