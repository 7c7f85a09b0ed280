// SPDX-License-Identifier: GPL-3.0-only

//! Routing of device events to module objects
//!
//! Every (module, factory) pair has a slot mapping device syspaths to the
//! module object that claims them. A claimed device's events go to its owner
//! and to nobody else in that slot. Unclaimed devices are first offered to
//! the slot's existing objects, then to the factory. A removed device is
//! never claimed afterwards. An object lives while it claims at least one
//! device, unless it keeps itself alive across the removal of its last one.
//!
//! The registry is owned by the dispatcher task and needs no locking.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use storage_types::{Device, ObjectPath, PropertyBag, UeventAction};

use crate::attacher::diff_interfaces;
use crate::housekeeping::HousekeepingTargets;
use crate::module::{ClaimDecision, ModuleDescriptor, ModuleObject, ObjectFactory};
use crate::object_manager::{ExportedObject, ObjectManager};

struct Slot {
    module_id: String,
    factory: Arc<dyn ObjectFactory>,
    claimed: HashMap<String, ObjectPath>,
}

struct Owner {
    slot: usize,
    object: Box<dyn ModuleObject>,
    claimed: BTreeSet<String>,
    exported: BTreeMap<String, PropertyBag>,
}

impl Owner {
    fn current_interfaces(&self) -> BTreeMap<String, PropertyBag> {
        self.object
            .interfaces()
            .into_iter()
            .map(|(name, properties)| (name.to_string(), properties))
            .collect()
    }
}

#[derive(Default)]
pub struct ClaimRegistry {
    slots: Vec<Slot>,
    known_modules: HashSet<String>,
    owners: BTreeMap<ObjectPath, Owner>,
    housekeeping: HousekeepingTargets,
}

impl ClaimRegistry {
    pub fn new(housekeeping: HousekeepingTargets) -> Self {
        Self {
            housekeeping,
            ..Self::default()
        }
    }

    /// Add slots for modules loaded since the last call
    pub fn sync_modules(&mut self, modules: &[Arc<ModuleDescriptor>]) {
        for module in modules {
            if !self.known_modules.insert(module.id.clone()) {
                continue;
            }
            for factory in &module.factories {
                tracing::debug!("Routing slot {}/{}", module.id, factory.name());
                self.slots.push(Slot {
                    module_id: module.id.clone(),
                    factory: factory.clone(),
                    claimed: HashMap::new(),
                });
            }
        }
    }

    pub fn route(&mut self, action: UeventAction, device: &Device, objects: &ObjectManager) {
        let syspath = device.syspath();
        let mut satisfied: HashSet<String> = HashSet::new();

        for index in 0..self.slots.len() {
            if let Some(path) = self.slots[index].claimed.get(syspath).cloned() {
                self.deliver_to_owner(index, &path, action, device, objects);
                // The device just gave up or kept its owner; no new object for it here
                continue;
            }

            let module_id = self.slots[index].module_id.clone();
            if action == UeventAction::Remove || satisfied.contains(&module_id) {
                continue;
            }

            if self.offer_to_existing(index, action, device, objects)
                || self.create_from_factory(index, device, objects)
            {
                satisfied.insert(module_id);
            }
        }
    }

    /// Re-publish the interfaces of `path` after its state changed outside an event
    pub fn resync(&mut self, path: &ObjectPath, objects: &ObjectManager) {
        if self.owners.contains_key(path) {
            self.publish(path, objects);
        }
    }

    /// Owners of `syspath`, one per slot that claims it
    pub fn owners_of(&self, syspath: &str) -> Vec<ObjectPath> {
        self.slots
            .iter()
            .filter_map(|slot| slot.claimed.get(syspath).cloned())
            .collect()
    }

    /// Syspaths claimed by the object at `path`
    pub fn claims_of(&self, path: &ObjectPath) -> Vec<String> {
        self.owners
            .get(path)
            .map(|owner| owner.claimed.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn object_paths(&self) -> Vec<ObjectPath> {
        self.owners.keys().cloned().collect()
    }

    fn deliver_to_owner(
        &mut self,
        index: usize,
        path: &ObjectPath,
        action: UeventAction,
        device: &Device,
        objects: &ObjectManager,
    ) {
        let syspath = device.syspath();
        let Some(owner) = self.owners.get_mut(path) else {
            tracing::error!(
                "Invariant violated: {syspath} is claimed by unknown object {path}, dropping claim"
            );
            self.slots[index].claimed.remove(syspath);
            return;
        };

        let decision = match owner.object.process_uevent(action, device) {
            Ok(decision) => decision,
            Err(e) => {
                tracing::warn!("{path} failed to process {action} on {syspath}: {e}");
                ClaimDecision::Release
            }
        };

        match decision {
            ClaimDecision::Keep => {
                if action == UeventAction::Remove {
                    self.slots[index].claimed.remove(syspath);
                    owner.claimed.remove(syspath);
                }
                self.publish(path, objects);
            }
            ClaimDecision::Release => {
                self.slots[index].claimed.remove(syspath);
                owner.claimed.remove(syspath);
                if owner.claimed.is_empty() {
                    self.destroy(path, objects);
                } else {
                    self.publish(path, objects);
                }
            }
            ClaimDecision::Dead => self.destroy(path, objects),
        }
    }

    fn offer_to_existing(
        &mut self,
        index: usize,
        action: UeventAction,
        device: &Device,
        objects: &ObjectManager,
    ) -> bool {
        let candidates: Vec<ObjectPath> = self
            .owners
            .iter()
            .filter(|(_, owner)| owner.slot == index)
            .map(|(path, _)| path.clone())
            .collect();

        for path in candidates {
            let Some(owner) = self.owners.get_mut(&path) else {
                continue;
            };
            match owner.object.process_uevent(action, device) {
                Ok(ClaimDecision::Keep) => {
                    tracing::debug!("{path} absorbs {}", device.syspath());
                    owner.claimed.insert(device.syspath().to_string());
                    self.slots[index]
                        .claimed
                        .insert(device.syspath().to_string(), path.clone());
                    self.publish(&path, objects);
                    return true;
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("{path} failed to consider {}: {e}", device.syspath()),
            }
        }
        false
    }

    fn create_from_factory(&mut self, index: usize, device: &Device, objects: &ObjectManager) -> bool {
        let slot = &self.slots[index];
        let object = match slot.factory.create(device) {
            Ok(Some(object)) => object,
            Ok(None) => return false,
            Err(e) => {
                tracing::warn!(
                    "Factory {}/{} failed on {}: {e}",
                    slot.module_id,
                    slot.factory.name(),
                    device.syspath()
                );
                return false;
            }
        };

        let path = object.path().clone();
        if self.owners.contains_key(&path) {
            tracing::error!(
                "Invariant violated: factory {}/{} produced existing object {path}, discarding it",
                slot.module_id,
                slot.factory.name()
            );
            return false;
        }

        let mut owner = Owner {
            slot: index,
            object,
            claimed: BTreeSet::from([device.syspath().to_string()]),
            exported: BTreeMap::new(),
        };
        owner.exported = owner.current_interfaces();

        if let Err(e) = objects.register(ExportedObject::new(path.clone(), owner.exported.clone())) {
            tracing::error!("Discarding module object: {e}");
            return false;
        }
        if let Some(target) = owner.object.housekeeping() {
            self.housekeeping.insert(path.clone(), target);
        }
        tracing::info!("Module {} created {path}", slot.module_id);

        self.slots[index]
            .claimed
            .insert(device.syspath().to_string(), path.clone());
        self.owners.insert(path, owner);
        true
    }

    fn publish(&mut self, path: &ObjectPath, objects: &ObjectManager) {
        let Some(owner) = self.owners.get_mut(path) else {
            return;
        };
        let current = owner.current_interfaces();
        let changes = diff_interfaces(&owner.exported, &current);
        owner.exported = current;
        if let Err(e) = objects.apply(path, changes) {
            tracing::error!("{e}");
        }
    }

    fn destroy(&mut self, path: &ObjectPath, objects: &ObjectManager) {
        let Some(owner) = self.owners.remove(path) else {
            return;
        };
        let slot = &mut self.slots[owner.slot];
        slot.claimed.retain(|_, claimed_by| claimed_by != path);
        self.housekeeping.remove(path);
        objects.unregister(path);
        tracing::info!("Module {} removed {path}", slot.module_id);
    }
}
