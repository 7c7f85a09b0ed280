// SPDX-License-Identifier: GPL-3.0-only

use serde::{Deserialize, Serialize};

/// Status of one VDO volume
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VdoInfo {
    pub name: String,
    pub operating_mode: String,
    pub compression_state: String,
    pub index_state: String,
    pub used_size: u64,
    pub logical_size: u64,
    pub physical_size: u64,
    pub compression: bool,
    pub deduplication: bool,
}
