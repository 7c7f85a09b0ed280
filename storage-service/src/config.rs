// SPDX-License-Identifier: GPL-3.0-only

//! Daemon configuration
//!
//! Read from `/etc/storaged/storaged.conf` (TOML). A missing file yields the
//! defaults; a malformed one is an error.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, ServiceError};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/storaged/storaged.conf";

/// When configured modules are loaded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModulesLoadPreference {
    /// Only when a client calls `EnableModules`
    #[default]
    OnDemand,
    OnStartup,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DaemonSection {
    pub modules: Vec<String>,
    pub modules_load_preference: ModulesLoadPreference,
    pub housekeeping_interval_secs: u64,
    pub wait_for_timeout_secs: u64,
}

impl Default for DaemonSection {
    fn default() -> Self {
        Self {
            modules: crate::module::catalog::builtin_names(),
            modules_load_preference: ModulesLoadPreference::default(),
            housekeeping_interval_secs: 600,
            wait_for_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ZramSection {
    pub modules_load_dir: PathBuf,
    pub modprobe_dir: PathBuf,
    pub conf_dir: PathBuf,
}

impl Default for ZramSection {
    fn default() -> Self {
        Self {
            modules_load_dir: PathBuf::from("/usr/lib/modules-load.d"),
            modprobe_dir: PathBuf::from("/usr/lib/modprobe.d"),
            conf_dir: PathBuf::from("/usr/local/lib/zram.conf.d"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IscsiSection {
    pub initiator_name_file: PathBuf,
}

impl Default for IscsiSection {
    fn default() -> Self {
        Self {
            initiator_name_file: PathBuf::from("/etc/iscsi/initiatorname.iscsi"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DaemonConfig {
    pub daemon: DaemonSection,
    pub zram: ZramSection,
    pub iscsi: IscsiSection,
}

impl DaemonConfig {
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::parse(&contents)
                .map_err(|e| ServiceError::Config(format!("{}: {e}", path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No configuration at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(ServiceError::Config(format!(
                "Failed to read {}: {e}",
                path.display()
            ))),
        }
    }

    pub fn parse(contents: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    pub fn housekeeping_interval(&self) -> Duration {
        Duration::from_secs(self.daemon.housekeeping_interval_secs.max(1))
    }

    pub fn wait_for_timeout(&self) -> Duration {
        Duration::from_secs(self.daemon.wait_for_timeout_secs)
    }
}
