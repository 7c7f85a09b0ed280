// SPDX-License-Identifier: GPL-3.0-only

use serde::{Deserialize, Serialize};

/// Identity of the bus peer that issued a method call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerInfo {
    pub uid: u32,
    pub pid: u32,
    pub username: Option<String>,
    pub sender: String,
}

impl CallerInfo {
    pub fn new(uid: u32, pid: u32, username: Option<String>, sender: impl Into<String>) -> Self {
        Self {
            uid,
            pid,
            username,
            sender: sender.into(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.uid == 0
    }
}
