// SPDX-License-Identifier: GPL-3.0-only

//! Object paths of exported storage objects
//!
//! Every object lives below [`OBJECT_ROOT`]. Block and drive objects derive
//! their last segment from the device file or vital product data; module
//! objects pick their own segments. Segments are escaped so that anything
//! outside `[A-Za-z0-9_]` becomes `_<hex-hex>`.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Root of the exported object tree
pub const OBJECT_ROOT: &str = "/org/storaged/Storaged";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid object path: {0}")]
pub struct InvalidObjectPath(pub String);

/// A validated D-Bus object path
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectPath(String);

impl ObjectPath {
    pub fn new(path: impl Into<String>) -> Result<Self, InvalidObjectPath> {
        let path = path.into();
        if is_valid(&path) {
            Ok(Self(path))
        } else {
            Err(InvalidObjectPath(path))
        }
    }

    /// `/org/storaged/Storaged`
    pub fn root() -> Self {
        Self(OBJECT_ROOT.to_string())
    }

    /// `/org/storaged/Storaged/Manager`, home of every manager interface
    pub fn manager() -> Self {
        Self::root().child("Manager")
    }

    /// The "no object" path used for unset object-path properties
    pub fn none() -> Self {
        Self("/".to_string())
    }

    /// Append one escaped segment
    pub fn child(&self, segment: &str) -> Self {
        let escaped = escape_segment(segment);
        if self.0 == "/" {
            Self(format!("/{escaped}"))
        } else {
            Self(format!("{}/{escaped}", self.0))
        }
    }

    /// Path of the block object for a device file (`/dev/sdb1` -> `.../block_devices/sdb1`)
    pub fn for_block_device(device_file: &str) -> Self {
        let name = device_file.strip_prefix("/dev/").unwrap_or(device_file);
        Self::root().child("block_devices").child(name)
    }

    /// Path of the drive object for a vital product identifier
    pub fn for_drive(vpd: &str) -> Self {
        Self::root().child("drives").child(vpd)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_none(&self) -> bool {
        self.0 == "/"
    }

    /// Last segment of the path
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or_default()
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ObjectPath {
    type Error = InvalidObjectPath;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for ObjectPath {
    type Error = InvalidObjectPath;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ObjectPath> for String {
    fn from(value: ObjectPath) -> Self {
        value.0
    }
}

impl AsRef<str> for ObjectPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Escape one path segment: `[A-Za-z0-9_]` pass through, every other byte becomes `_xx`
pub fn escape_segment(segment: &str) -> String {
    let mut escaped = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' {
            escaped.push(byte as char);
        } else {
            escaped.push_str(&format!("_{byte:02x}"));
        }
    }
    if escaped.is_empty() {
        escaped.push('_');
    }
    escaped
}

fn is_valid(path: &str) -> bool {
    if path == "/" {
        return true;
    }
    if !path.starts_with('/') || path.ends_with('/') {
        return false;
    }
    path[1..].split('/').all(|segment| {
        !segment.is_empty()
            && segment
                .bytes()
                .all(|byte| byte.is_ascii_alphanumeric() || byte == b'_')
    })
}
