// SPDX-License-Identifier: GPL-3.0-only

use serde::{Deserialize, Serialize};

/// Binding of a loop device to its backing file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopInfo {
    pub device: String,
    pub backing_file: Option<String>,
    pub autoclear: bool,
}
