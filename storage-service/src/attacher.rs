// SPDX-License-Identifier: GPL-3.0-only

//! Keeps the interfaces on block and drive objects in sync with the entries
//! modules contribute.

use std::collections::BTreeMap;
use std::sync::Arc;

use storage_types::{PropertyBag, UeventAction};

use crate::interface::{InterfaceChange, InterfaceEntry, InterfaceInstance};
use crate::object::TypedObject;

/// Run every entry against `object`, in order, and return what changed.
///
/// An instance is created the first time its entry's `check` passes and
/// dropped as soon as it fails. Existing instances whose `update` reports no
/// change produce nothing.
pub fn sync_interfaces(
    object: &mut TypedObject,
    action: Option<UeventAction>,
    entries: &[Arc<dyn InterfaceEntry>],
) -> Vec<InterfaceChange> {
    let mut changes = Vec::new();

    for entry in entries {
        let tag = entry.type_tag();
        let wanted = entry.check(object);
        let slot = object.interfaces.remove(tag);

        let (mut instance, fresh) = match (slot, wanted) {
            (None, false) => continue,
            (Some(_), false) => {
                tracing::debug!("Detaching {tag} from {}", object.path);
                changes.push(InterfaceChange::Removed {
                    interface: tag.to_string(),
                });
                continue;
            }
            (Some(instance), true) => (instance, false),
            (None, true) => {
                entry.connect(object);
                (InterfaceInstance::new(tag), true)
            }
        };

        let before = instance.properties.clone();
        let changed = entry.update(object, action, &mut instance);

        if fresh {
            tracing::debug!("Attaching {tag} to {}", object.path);
            changes.push(InterfaceChange::Added {
                interface: tag.to_string(),
                properties: instance.properties.clone(),
            });
        } else if changed
            && let Some(change) = InterfaceChange::changed(tag, &before, &instance.properties)
        {
            changes.push(change);
        }

        object.interfaces.insert(tag.to_string(), instance);
    }

    changes
}

/// Compare two exported interface sets of a module object
pub fn diff_interfaces(
    old: &BTreeMap<String, PropertyBag>,
    new: &BTreeMap<String, PropertyBag>,
) -> Vec<InterfaceChange> {
    let mut changes: Vec<InterfaceChange> = old
        .keys()
        .filter(|interface| !new.contains_key(*interface))
        .map(|interface| InterfaceChange::Removed {
            interface: interface.clone(),
        })
        .collect();

    for (interface, properties) in new {
        match old.get(interface) {
            None => changes.push(InterfaceChange::Added {
                interface: interface.clone(),
                properties: properties.clone(),
            }),
            Some(previous) => changes.extend(InterfaceChange::changed(interface, previous, properties)),
        }
    }

    changes
}
