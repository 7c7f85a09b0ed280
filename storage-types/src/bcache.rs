// SPDX-License-Identifier: GPL-3.0-only

use serde::{Deserialize, Serialize};

/// Statistics of one bcache device
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BcacheStats {
    pub state: String,
    pub mode: String,
    pub block_size: u64,
    pub cache_size: u64,
    pub cache_used: u64,
    pub hits: u64,
    pub misses: u64,
    pub bypass_hits: u64,
    pub bypass_misses: u64,
}
