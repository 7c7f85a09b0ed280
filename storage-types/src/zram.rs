// SPDX-License-Identifier: GPL-3.0-only

//! Persisted zRAM configuration records
//!
//! Three kinds of files describe the zRAM setup so that it survives reboots:
//! a module-load directive, a modprobe parameter file and one env file per
//! device.

use serde::{Deserialize, Serialize};

/// File name used for both the module-load directive and the modprobe options
pub const ZRAM_CONF_NAME: &str = "zram.conf";

/// Env-file description of one managed zRAM device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZramDeviceConfig {
    pub index: u32,
    pub size_bytes: u64,
    pub swap: bool,
}

impl ZramDeviceConfig {
    pub fn new(index: u32, size_bytes: u64) -> Self {
        Self {
            index,
            size_bytes,
            swap: false,
        }
    }

    pub fn device_name(&self) -> String {
        format!("zram{}", self.index)
    }

    pub fn device_file(&self) -> String {
        format!("/dev/zram{}", self.index)
    }

    pub fn env_file_name(&self) -> String {
        format!("zram{}-env", self.index)
    }

    pub fn render(&self) -> String {
        format!(
            "ZRAM_NUM_STR={}\nZRAM_DEV_SIZE={}\nSWAP={}\n",
            self.index,
            self.size_bytes,
            if self.swap { "y" } else { "n" }
        )
    }
}

/// Live statistics of one zRAM device
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZramStats {
    pub disksize: u64,
    pub num_reads: u64,
    pub num_writes: u64,
    pub comp_algorithm: String,
    pub max_comp_streams: u64,
    pub orig_data_size: u64,
    pub compr_data_size: u64,
    pub mem_used_total: u64,
    /// Whether the device is currently active as swap
    pub active: bool,
}

/// Contents of the modules-load.d directive
pub fn modules_load_directive() -> &'static str {
    "zram\n"
}

/// Contents of the modprobe.d parameter file
pub fn modprobe_options(num_devices: usize) -> String {
    format!("options zram num_devices={num_devices}\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_file_lists_the_three_keys() {
        let config = ZramDeviceConfig::new(1, 64 * 1024 * 1024);
        assert_eq!(config.env_file_name(), "zram1-env");
        assert_eq!(
            config.render(),
            "ZRAM_NUM_STR=1\nZRAM_DEV_SIZE=67108864\nSWAP=n\n"
        );
    }

    #[test]
    fn modprobe_options_carry_device_count() {
        assert_eq!(modprobe_options(2), "options zram num_devices=2\n");
    }
}
