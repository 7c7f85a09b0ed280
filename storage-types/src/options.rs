// SPDX-License-Identifier: GPL-3.0-only

//! Option bags passed as the trailing argument of every remote method

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Option names with a meaning shared across methods
pub mod known_options {
    pub const NO_USER_INTERACTION: &str = "auth-no-user-interaction";
    pub const FSTYPE: &str = "fstype";
    pub const LABEL: &str = "label";
    pub const FORCE: &str = "force";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    U64(u64),
    I64(i64),
    Str(String),
}

impl OptionValue {
    fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "boolean",
            Self::U64(_) => "unsigned integer",
            Self::I64(_) => "integer",
            Self::Str(_) => "string",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OptionError {
    #[error("option '{name}' must be a {expected}, got a {actual}")]
    WrongType {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("unknown option '{0}'")]
    Unknown(String),
}

/// Typed mapping from option name to value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OptionBag(BTreeMap<String, OptionValue>);

impl OptionBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: OptionValue) -> Self {
        self.0.insert(name.into(), value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: OptionValue) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&OptionValue> {
        self.0.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn bool(&self, name: &str) -> Result<Option<bool>, OptionError> {
        match self.0.get(name) {
            None => Ok(None),
            Some(OptionValue::Bool(value)) => Ok(Some(*value)),
            Some(other) => Err(wrong_type(name, "boolean", other)),
        }
    }

    pub fn string(&self, name: &str) -> Result<Option<&str>, OptionError> {
        match self.0.get(name) {
            None => Ok(None),
            Some(OptionValue::Str(value)) => Ok(Some(value.as_str())),
            Some(other) => Err(wrong_type(name, "string", other)),
        }
    }

    pub fn u64(&self, name: &str) -> Result<Option<u64>, OptionError> {
        match self.0.get(name) {
            None => Ok(None),
            Some(OptionValue::U64(value)) => Ok(Some(*value)),
            Some(OptionValue::I64(value)) if *value >= 0 => Ok(Some(*value as u64)),
            Some(other) => Err(wrong_type(name, "unsigned integer", other)),
        }
    }

    /// `auth-no-user-interaction`; a malformed value counts as "interaction allowed"
    pub fn no_user_interaction(&self) -> bool {
        self.bool(known_options::NO_USER_INTERACTION)
            .ok()
            .flatten()
            .unwrap_or(false)
    }

    pub fn force(&self) -> Result<bool, OptionError> {
        Ok(self.bool(known_options::FORCE)?.unwrap_or(false))
    }

    pub fn label(&self) -> Result<Option<&str>, OptionError> {
        self.string(known_options::LABEL)
    }

    pub fn fstype(&self) -> Result<Option<&str>, OptionError> {
        self.string(known_options::FSTYPE)
    }

    /// Reject any option outside `allowed`; the authorization option is always allowed
    pub fn ensure_only(&self, allowed: &[&str]) -> Result<(), OptionError> {
        match self.0.keys().find(|name| {
            name.as_str() != known_options::NO_USER_INTERACTION && !allowed.contains(&name.as_str())
        }) {
            Some(name) => Err(OptionError::Unknown(name.clone())),
            None => Ok(()),
        }
    }
}

fn wrong_type(name: &str, expected: &'static str, actual: &OptionValue) -> OptionError {
    OptionError::WrongType {
        name: name.to_string(),
        expected,
        actual: actual.type_name(),
    }
}
