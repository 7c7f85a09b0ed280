// SPDX-License-Identifier: GPL-3.0-only

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ObjectPath;

/// Value of one exported interface property
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    Bool(bool),
    U64(u64),
    I64(i64),
    Str(String),
    StrList(Vec<String>),
    Path(ObjectPath),
    PathList(Vec<ObjectPath>),
}

/// Properties of one interface, keyed by property name
pub type PropertyBag = BTreeMap<String, PropertyValue>;

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::U64(value) => write!(f, "{value}"),
            Self::I64(value) => write!(f, "{value}"),
            Self::Str(value) => write!(f, "{value}"),
            Self::StrList(values) => write!(f, "{}", values.join(", ")),
            Self::Path(path) => write!(f, "'{path}'"),
            Self::PathList(paths) => {
                let rendered: Vec<String> = paths.iter().map(|path| format!("'{path}'")).collect();
                write!(f, "{}", rendered.join(", "))
            }
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<u64> for PropertyValue {
    fn from(value: u64) -> Self {
        Self::U64(value)
    }
}

impl From<u32> for PropertyValue {
    fn from(value: u32) -> Self {
        Self::U64(u64::from(value))
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::I64(value)
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<Vec<String>> for PropertyValue {
    fn from(value: Vec<String>) -> Self {
        Self::StrList(value)
    }
}

impl From<ObjectPath> for PropertyValue {
    fn from(value: ObjectPath) -> Self {
        Self::Path(value)
    }
}

impl From<Vec<ObjectPath>> for PropertyValue {
    fn from(value: Vec<ObjectPath>) -> Self {
        Self::PathList(value)
    }
}

/// Entries of `new` that are absent from `old` or differ from it
pub fn property_delta(old: &PropertyBag, new: &PropertyBag) -> PropertyBag {
    new.iter()
        .filter(|(key, value)| old.get(*key) != Some(*value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}
