// SPDX-License-Identifier: GPL-3.0-only

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Device;

/// Kernel uevent action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UeventAction {
    Add,
    Change,
    Remove,
}

impl UeventAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Change => "change",
            Self::Remove => "remove",
        }
    }
}

impl fmt::Display for UeventAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported uevent action: {0}")]
pub struct ParseActionError(pub String);

impl FromStr for UeventAction {
    type Err = ParseActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add" => Ok(Self::Add),
            "change" | "online" | "offline" | "bind" | "unbind" | "move" => Ok(Self::Change),
            "remove" => Ok(Self::Remove),
            other => Err(ParseActionError(other.to_string())),
        }
    }
}

/// One event from the device source: an action and the device snapshot it applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uevent {
    pub action: UeventAction,
    pub device: Arc<Device>,
}

impl Uevent {
    pub fn new(action: UeventAction, device: Device) -> Self {
        Self {
            action,
            device: Arc::new(device),
        }
    }

    pub fn add(device: Device) -> Self {
        Self::new(UeventAction::Add, device)
    }

    pub fn change(device: Device) -> Self {
        Self::new(UeventAction::Change, device)
    }

    pub fn remove(device: Device) -> Self {
        Self::new(UeventAction::Remove, device)
    }

    pub fn syspath(&self) -> &str {
        self.device.syspath()
    }
}
