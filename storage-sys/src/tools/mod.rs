// SPDX-License-Identifier: GPL-3.0-only

//! Wrappers around the per-technology command-line tools and sysfs knobs

pub mod bcache;
pub mod btrfs;
pub mod iscsi;
pub mod loops;
pub mod lvm;
pub mod vdo;
pub mod zram;

use std::fs;
use std::path::Path;

use crate::{Result, SysError};

/// Trimmed content of a sysfs attribute
pub(crate) fn read_attribute(path: &Path) -> Result<String> {
    match fs::read_to_string(path) {
        Ok(value) => Ok(value.trim().to_string()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(SysError::DeviceNotFound(path.display().to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

pub(crate) fn read_u64_attribute(path: &Path) -> Result<u64> {
    let value = read_attribute(path)?;
    value
        .parse()
        .map_err(|_| SysError::parse(path.display().to_string(), value))
}

/// Selected entry of a sysfs choice list such as `lzo [lz4] zstd`
pub(crate) fn selected_choice(value: &str) -> Option<&str> {
    value
        .split_whitespace()
        .find_map(|choice| choice.strip_prefix('[')?.strip_suffix(']'))
}

/// Last path component of a device file (`/dev/zram0` -> `zram0`)
pub(crate) fn device_name(device: &str) -> &str {
    device.rsplit('/').next().unwrap_or(device)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_bracketed_choice() {
        assert_eq!(selected_choice("lzo lzo-rle [zstd] lz4"), Some("zstd"));
        assert_eq!(selected_choice("writethrough writeback"), None);
    }
}
