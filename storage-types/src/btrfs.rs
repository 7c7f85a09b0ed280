// SPDX-License-Identifier: GPL-3.0-only

use serde::{Deserialize, Serialize};

/// Filesystem-level facts about a BTRFS volume, as seen through one member device
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BtrfsInfo {
    pub label: String,
    pub uuid: String,
    pub num_devices: u64,
    pub used: u64,
}

/// RAID profile accepted by volume creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BtrfsRaidLevel {
    Single,
    Dup,
    Raid0,
    Raid1,
    Raid10,
    Raid5,
    Raid6,
}

impl BtrfsRaidLevel {
    pub fn parse(level: &str) -> Option<Self> {
        match level.to_ascii_lowercase().as_str() {
            "single" => Some(Self::Single),
            "dup" => Some(Self::Dup),
            "raid0" => Some(Self::Raid0),
            "raid1" => Some(Self::Raid1),
            "raid10" => Some(Self::Raid10),
            "raid5" => Some(Self::Raid5),
            "raid6" => Some(Self::Raid6),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Dup => "dup",
            Self::Raid0 => "raid0",
            Self::Raid1 => "raid1",
            Self::Raid10 => "raid10",
            Self::Raid5 => "raid5",
            Self::Raid6 => "raid6",
        }
    }

    /// Smallest number of member devices the profile can be built on
    pub fn min_devices(self) -> usize {
        match self {
            Self::Single | Self::Dup => 1,
            Self::Raid0 | Self::Raid1 | Self::Raid5 => 2,
            Self::Raid6 => 3,
            Self::Raid10 => 4,
        }
    }
}
