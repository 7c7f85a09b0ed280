// SPDX-License-Identifier: GPL-3.0-only

//! LVM2 records returned by the block library

use serde::{Deserialize, Serialize};

/// Physical volume membership of one block device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalVolumeInfo {
    pub device: String,
    /// Volume group the PV belongs to; `None` for an orphan PV
    pub vg_name: Option<String>,
    pub vg_uuid: Option<String>,
}

/// Volume group summary
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeGroupInfo {
    pub name: String,
    pub uuid: String,
    pub size: u64,
    pub free: u64,
    pub pv_count: u32,
    pub lv_count: u32,
}

impl VolumeGroupInfo {
    pub fn used(&self) -> u64 {
        self.size.saturating_sub(self.free)
    }
}

/// Split a device-mapper name for an LV (`vg-lv`, dashes doubled) into VG and LV names
pub fn split_dm_name(dm_name: &str) -> Option<(String, String)> {
    let bytes = dm_name.as_bytes();
    let mut index = 0;
    while index < bytes.len() {
        if bytes[index] == b'-' {
            if bytes.get(index + 1) == Some(&b'-') {
                index += 2;
                continue;
            }
            let vg = dm_name[..index].replace("--", "-");
            let lv = dm_name[index + 1..].replace("--", "-");
            if vg.is_empty() || lv.is_empty() {
                return None;
            }
            return Some((vg, lv));
        }
        index += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::split_dm_name;

    #[test]
    fn doubled_dashes_are_unescaped() {
        assert_eq!(
            split_dm_name("my--vg-root--lv"),
            Some(("my-vg".to_string(), "root-lv".to_string()))
        );
    }

    #[test]
    fn names_without_separator_are_rejected() {
        assert_eq!(split_dm_name("plain"), None);
        assert_eq!(split_dm_name("vg-"), None);
    }
}
