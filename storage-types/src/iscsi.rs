// SPDX-License-Identifier: GPL-3.0-only

use serde::{Deserialize, Serialize};

/// One node record found by SendTargets discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IscsiNode {
    pub name: String,
    pub tpgt: i32,
    pub address: String,
    pub port: i32,
    pub iface: String,
}

/// Parameters of an established session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IscsiSessionInfo {
    pub session_id: String,
    pub target_name: String,
    pub tpgt: i32,
    pub address: String,
    pub port: i32,
    pub persistent_address: String,
    pub persistent_port: i32,
}

/// Session number for devices that sit below `/sessionN/` in sysfs
pub fn session_id_from_syspath(syspath: &str) -> Option<String> {
    syspath
        .split('/')
        .find(|segment| {
            segment
                .strip_prefix("session")
                .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
        })
        .map(ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::session_id_from_syspath;

    #[test]
    fn finds_session_segment() {
        let syspath = "/sys/devices/platform/host3/session7/target3:0:0/3:0:0:1/block/sdd";
        assert_eq!(session_id_from_syspath(syspath), Some("session7".to_string()));
    }

    #[test]
    fn ignores_devices_outside_sessions() {
        assert_eq!(session_id_from_syspath("/sys/devices/virtual/block/loop0"), None);
        assert_eq!(session_id_from_syspath("/sys/devices/sessionx/block/sde"), None);
    }
}
