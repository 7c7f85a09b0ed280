// SPDX-License-Identifier: GPL-3.0-only

//! Interfaces attached to block and drive objects
//!
//! Modules contribute [`InterfaceEntry`] values. For every object and entry
//! the attacher asks `check` whether the interface belongs on the object,
//! calls `connect` once when it is first attached, and `update` on every
//! event so the entry can refresh the instance's properties.

use storage_types::{PropertyBag, PropertyValue, UeventAction, property_delta};

use crate::object::TypedObject;

pub trait InterfaceEntry: Send + Sync {
    /// Exported interface name, unique across all loaded modules
    fn type_tag(&self) -> &'static str;

    /// Should the interface be present on `object`?
    fn check(&self, object: &TypedObject) -> bool;

    /// One-time hook before the first `update` of a fresh instance
    fn connect(&self, _object: &TypedObject) {}

    /// Refresh `instance` from `object`; returns whether anything changed
    fn update(
        &self,
        object: &TypedObject,
        action: Option<UeventAction>,
        instance: &mut InterfaceInstance,
    ) -> bool;
}

/// One attached interface and the properties it currently exports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceInstance {
    pub type_tag: &'static str,
    pub properties: PropertyBag,
}

impl InterfaceInstance {
    pub fn new(type_tag: &'static str) -> Self {
        Self {
            type_tag,
            properties: PropertyBag::new(),
        }
    }

    /// Set one property, reporting whether its value changed
    pub fn set(&mut self, name: &str, value: impl Into<PropertyValue>) -> bool {
        let value = value.into();
        if self.properties.get(name) == Some(&value) {
            return false;
        }
        self.properties.insert(name.to_string(), value);
        true
    }

    /// Replace every property at once, reporting whether anything changed
    pub fn replace(&mut self, properties: PropertyBag) -> bool {
        if self.properties == properties {
            return false;
        }
        self.properties = properties;
        true
    }
}

/// What the bus has to be told about one interface of one object
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterfaceChange {
    Added {
        interface: String,
        properties: PropertyBag,
    },
    Removed {
        interface: String,
    },
    /// Only the properties whose values changed
    Changed {
        interface: String,
        changed: PropertyBag,
    },
}

impl InterfaceChange {
    pub fn interface(&self) -> &str {
        match self {
            Self::Added { interface, .. }
            | Self::Removed { interface }
            | Self::Changed { interface, .. } => interface,
        }
    }

    pub(crate) fn changed(interface: &str, old: &PropertyBag, new: &PropertyBag) -> Option<Self> {
        let changed = property_delta(old, new);
        (!changed.is_empty()).then(|| Self::Changed {
            interface: interface.to_string(),
            changed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_reports_only_real_changes() {
        let mut instance = InterfaceInstance::new("org.storaged.Storaged.Filesystem.BTRFS");
        assert!(instance.set("label", "root"));
        assert!(!instance.set("label", "root"));
        assert!(instance.set("label", "data"));
    }

    #[test]
    fn changed_is_none_for_identical_bags() {
        let mut bag = PropertyBag::new();
        bag.insert("num_devices".into(), 2u64.into());
        assert_eq!(InterfaceChange::changed("x", &bag, &bag), None);
    }
}
