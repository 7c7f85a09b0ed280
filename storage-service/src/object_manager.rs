// SPDX-License-Identifier: GPL-3.0-only

//! Registry of exported objects
//!
//! Mutations queue bus events; [`ObjectManager::flush`] hands the queue to
//! subscribers in order, so a client never observes half of one device event.
//! Flushing also publishes a snapshot of the objects and bumps a generation
//! counter that [`ObjectManager::wait_for`] sleeps on. Waiters only see
//! published objects, so whatever they find has already been announced.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use storage_types::{ObjectPath, PropertyBag};
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;

use crate::error::{Result, ServiceError};
use crate::interface::InterfaceChange;

pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(30);

const EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("timed out")]
pub struct TimeoutError;

/// An object as clients see it: a path and the property bags of its interfaces
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedObject {
    pub path: ObjectPath,
    pub interfaces: BTreeMap<String, PropertyBag>,
}

impl ExportedObject {
    pub fn new(path: ObjectPath, interfaces: BTreeMap<String, PropertyBag>) -> Self {
        Self { path, interfaces }
    }

    pub fn has_interface(&self, interface: &str) -> bool {
        self.interfaces.contains_key(interface)
    }

    pub fn interface(&self, interface: &str) -> Option<&PropertyBag> {
        self.interfaces.get(interface)
    }
}

/// Notification for bus clients
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    InterfacesAdded {
        path: ObjectPath,
        interfaces: BTreeMap<String, PropertyBag>,
    },
    InterfacesRemoved {
        path: ObjectPath,
        interfaces: Vec<String>,
    },
    PropertiesChanged {
        path: ObjectPath,
        interface: String,
        changed: PropertyBag,
    },
}

impl BusEvent {
    pub fn path(&self) -> &ObjectPath {
        match self {
            Self::InterfacesAdded { path, .. }
            | Self::InterfacesRemoved { path, .. }
            | Self::PropertiesChanged { path, .. } => path,
        }
    }
}

type ObjectMap = BTreeMap<ObjectPath, Arc<ExportedObject>>;

/// Objects whose notifications have been flushed
pub struct Published<'a> {
    objects: &'a ObjectMap,
}

impl Published<'_> {
    pub fn get(&self, path: &ObjectPath) -> Option<&Arc<ExportedObject>> {
        self.objects.get(path)
    }

    pub fn contains(&self, path: &ObjectPath) -> bool {
        self.objects.contains_key(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ExportedObject>> {
        self.objects.values()
    }
}

pub struct ObjectManager {
    objects: RwLock<ObjectMap>,
    published: RwLock<ObjectMap>,
    pending: Mutex<Vec<BusEvent>>,
    events: broadcast::Sender<BusEvent>,
    generation: watch::Sender<u64>,
    default_timeout: Duration,
}

impl Default for ObjectManager {
    fn default() -> Self {
        Self::new(DEFAULT_WAIT_TIMEOUT)
    }
}

impl ObjectManager {
    pub fn new(default_timeout: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (generation, _) = watch::channel(0);
        Self {
            objects: RwLock::new(BTreeMap::new()),
            published: RwLock::new(BTreeMap::new()),
            pending: Mutex::new(Vec::new()),
            events,
            generation,
            default_timeout,
        }
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub fn register(&self, object: ExportedObject) -> Result<()> {
        {
            let mut objects = self.objects.write().unwrap_or_else(|e| e.into_inner());
            if objects.contains_key(&object.path) {
                return Err(ServiceError::InvariantViolation(format!(
                    "object {} is already registered",
                    object.path
                )));
            }
            tracing::debug!("Registering {}", object.path);
            self.queue(BusEvent::InterfacesAdded {
                path: object.path.clone(),
                interfaces: object.interfaces.clone(),
            });
            objects.insert(object.path.clone(), Arc::new(object));
        }
        Ok(())
    }

    pub fn unregister(&self, path: &ObjectPath) -> Option<Arc<ExportedObject>> {
        let mut objects = self.objects.write().unwrap_or_else(|e| e.into_inner());
        let removed = objects.remove(path)?;
        tracing::debug!("Unregistering {path}");
        self.queue(BusEvent::InterfacesRemoved {
            path: path.clone(),
            interfaces: removed.interfaces.keys().cloned().collect(),
        });
        Some(removed)
    }

    /// Apply interface changes to a registered object
    pub fn apply(&self, path: &ObjectPath, changes: Vec<InterfaceChange>) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }
        {
            let mut objects = self.objects.write().unwrap_or_else(|e| e.into_inner());
            let object = objects.get_mut(path).ok_or_else(|| {
                ServiceError::InvariantViolation(format!("changes for unregistered object {path}"))
            })?;
            let object = Arc::make_mut(object);

            for change in changes {
                match change {
                    InterfaceChange::Added {
                        interface,
                        properties,
                    } => {
                        object.interfaces.insert(interface.clone(), properties.clone());
                        self.queue(BusEvent::InterfacesAdded {
                            path: path.clone(),
                            interfaces: BTreeMap::from([(interface, properties)]),
                        });
                    }
                    InterfaceChange::Removed { interface } => {
                        if object.interfaces.remove(&interface).is_some() {
                            self.queue(BusEvent::InterfacesRemoved {
                                path: path.clone(),
                                interfaces: vec![interface],
                            });
                        }
                    }
                    InterfaceChange::Changed { interface, changed } => {
                        let Some(properties) = object.interfaces.get_mut(&interface) else {
                            tracing::error!("Property change for detached {interface} on {path}");
                            continue;
                        };
                        properties.extend(changed.clone());
                        self.queue(BusEvent::PropertiesChanged {
                            path: path.clone(),
                            interface,
                            changed,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, path: &ObjectPath) -> Option<Arc<ExportedObject>> {
        self.objects
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(path)
            .cloned()
    }

    pub fn contains(&self, path: &ObjectPath) -> bool {
        self.objects
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(path)
    }

    /// Consistent snapshot of every object, ordered by path
    pub fn iter(&self) -> Vec<Arc<ExportedObject>> {
        self.objects
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.objects.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Publish every queued notification, in order; returns how many were sent
    ///
    /// Waiters are woken only after the notifications are out.
    pub fn flush(&self) -> usize {
        let (pending, snapshot) = {
            let objects = self.objects.read().unwrap_or_else(|e| e.into_inner());
            let pending =
                std::mem::take(&mut *self.pending.lock().unwrap_or_else(|e| e.into_inner()));
            if pending.is_empty() {
                return 0;
            }
            (pending, objects.clone())
        };

        let count = pending.len();
        for event in pending {
            // No subscribers is not an error
            let _ = self.events.send(event);
        }
        *self.published.write().unwrap_or_else(|e| e.into_inner()) = snapshot;
        self.bump();
        count
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.events.subscribe()
    }

    /// Wait until an object matching `predicate` is published
    pub async fn wait_for<F>(
        &self,
        predicate: F,
        timeout: Option<Duration>,
    ) -> std::result::Result<Arc<ExportedObject>, TimeoutError>
    where
        F: Fn(&ExportedObject) -> bool,
    {
        self.wait_until(
            |published| {
                published
                    .iter()
                    .find(|object| predicate(object))
                    .cloned()
            },
            timeout,
        )
        .await
    }

    /// Wait until `check` yields a value, re-running it after every flush
    pub async fn wait_until<T, F>(
        &self,
        mut check: F,
        timeout: Option<Duration>,
    ) -> std::result::Result<T, TimeoutError>
    where
        F: FnMut(&Published<'_>) -> Option<T>,
    {
        let deadline = Instant::now() + timeout.unwrap_or(self.default_timeout);
        let mut generation = self.generation.subscribe();

        loop {
            generation.borrow_and_update();
            let found = {
                let objects = self.published.read().unwrap_or_else(|e| e.into_inner());
                check(&Published { objects: &objects })
            };
            if let Some(found) = found {
                return Ok(found);
            }
            match tokio::time::timeout_at(deadline, generation.changed()).await {
                Ok(Ok(())) => continue,
                Ok(Err(_)) | Err(_) => return Err(TimeoutError),
            }
        }
    }

    fn queue(&self, event: BusEvent) {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }

    fn bump(&self) {
        self.generation.send_modify(|generation| *generation += 1);
    }
}
