// SPDX-License-Identifier: GPL-3.0-only

use std::collections::HashMap;
use std::sync::Arc;

use storage_contracts::wire::{WireProperties, to_wire_properties};
use zbus::interface;
use zbus::object_server::SignalEmitter;
use zbus::zvariant::{self, OwnedObjectPath};

use crate::object_manager::{ExportedObject, ObjectManager};

/// Interfaces of one object as `GetManagedObjects` reports them
pub type WireInterfaces = HashMap<String, WireProperties>;

pub fn wire_interfaces(object: &ExportedObject) -> zvariant::Result<WireInterfaces> {
    object
        .interfaces
        .iter()
        .map(|(name, properties)| Ok((name.clone(), to_wire_properties(properties)?)))
        .collect()
}

/// `org.freedesktop.DBus.ObjectManager` over the exported object snapshot
#[derive(Clone)]
pub struct ObjectManagerIface {
    objects: Arc<ObjectManager>,
}

impl ObjectManagerIface {
    pub fn new(objects: Arc<ObjectManager>) -> Self {
        Self { objects }
    }
}

#[interface(name = "org.freedesktop.DBus.ObjectManager")]
impl ObjectManagerIface {
    /// Emitted after an object or some of its interfaces appeared
    #[zbus(signal)]
    pub async fn interfaces_added(
        emitter: &SignalEmitter<'_>,
        object_path: zvariant::ObjectPath<'_>,
        interfaces_and_properties: WireInterfaces,
    ) -> zbus::Result<()>;

    /// Emitted after an object or some of its interfaces went away
    #[zbus(signal)]
    pub async fn interfaces_removed(
        emitter: &SignalEmitter<'_>,
        object_path: zvariant::ObjectPath<'_>,
        interfaces: Vec<String>,
    ) -> zbus::Result<()>;

    /// Every exported object with all of its interfaces and properties
    ///
    /// Example:
    /// ```bash
    /// busctl call org.storaged.Storaged /org/storaged/Storaged \
    ///   org.freedesktop.DBus.ObjectManager GetManagedObjects
    /// ```
    async fn get_managed_objects(
        &self,
    ) -> zbus::fdo::Result<HashMap<OwnedObjectPath, WireInterfaces>> {
        self.objects
            .iter()
            .iter()
            .map(|object| {
                let path = OwnedObjectPath::try_from(object.path.as_str().to_string())
                    .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;
                let interfaces = wire_interfaces(object)
                    .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;
                Ok((path, interfaces))
            })
            .collect()
    }
}
