// SPDX-License-Identifier: GPL-3.0-only

//! `org.storaged.Storaged.Manager`, the root manager interface

use std::collections::HashMap;
use std::sync::Arc;

use storage_contracts::wire::options_from_wire;
use storage_macros::with_caller;
use storage_types::{ObjectPath, OptionBag};
use zbus::message::Header as MessageHeader;
use zbus::object_server::SignalEmitter;
use zbus::zvariant::{OwnedObjectPath, OwnedValue};
use zbus::{Connection, interface};

use super::serve_managers;
use crate::auth::{actions, authorize};
use crate::core_interfaces::{BLOCK_INTERFACE, find_block_by_file, find_blocks_by_property};
use crate::daemon::load_configured;
use crate::dispatcher::DispatchItem;
use crate::error::{Result, WireError};
use crate::module::{DaemonHandle, ModuleRegistry};
use crate::modules::to_wire_path;
use crate::object_manager::ObjectManager;

/// Keys `ResolveDevice` understands in its device specification
const DEVSPEC_KEYS: &[&str] = &["path", "label", "uuid"];

/// Every block object, ordered by path
pub fn block_devices(objects: &ObjectManager) -> Vec<ObjectPath> {
    objects
        .iter()
        .iter()
        .filter(|object| object.has_interface(BLOCK_INTERFACE))
        .map(|object| object.path.clone())
        .collect()
}

/// Block objects matching every key of `devspec`
pub fn resolve_device(objects: &ObjectManager, devspec: &OptionBag) -> Result<Vec<ObjectPath>> {
    devspec.ensure_only(DEVSPEC_KEYS)?;

    let mut candidates = block_devices(objects);
    if let Some(path) = devspec.string("path")? {
        let found = find_block_by_file(objects, path);
        candidates.retain(|candidate| Some(candidate) == found.as_ref());
    }
    if let Some(label) = devspec.string("label")? {
        let matching = find_blocks_by_property(objects, "IdLabel", label);
        candidates.retain(|candidate| matching.contains(candidate));
    }
    if let Some(uuid) = devspec.string("uuid")? {
        let matching = find_blocks_by_property(objects, "IdUUID", uuid);
        candidates.retain(|candidate| matching.contains(candidate));
    }
    Ok(candidates)
}

fn to_wire_paths(paths: &[ObjectPath]) -> Result<Vec<OwnedObjectPath>> {
    paths.iter().map(to_wire_path).collect()
}

#[derive(Clone)]
pub struct ManagerIface {
    registry: Arc<ModuleRegistry>,
    daemon: DaemonHandle,
}

impl ManagerIface {
    pub fn new(registry: Arc<ModuleRegistry>, daemon: DaemonHandle) -> Self {
        Self { registry, daemon }
    }
}

#[interface(name = "org.storaged.Storaged.Manager")]
impl ManagerIface {
    #[zbus(property)]
    async fn version(&self) -> String {
        env!("CARGO_PKG_VERSION").to_string()
    }

    /// Modules this build could load
    #[zbus(property)]
    async fn supported_modules(&self) -> Vec<String> {
        self.registry.supported()
    }

    #[zbus(property)]
    async fn loaded_modules(&self) -> Vec<String> {
        self.registry.loaded_names()
    }

    /// Load the configured modules and rescan devices
    ///
    /// Loading is one-way: passing `false` does nothing.
    ///
    /// Example:
    /// ```bash
    /// busctl call org.storaged.Storaged /org/storaged/Storaged/Manager \
    ///   org.storaged.Storaged.Manager EnableModules b true
    /// ```
    #[with_caller]
    async fn enable_modules(
        &self,
        #[zbus(connection)] connection: &Connection,
        #[zbus(header)] _header: MessageHeader<'_>,
        #[zbus(signal_context)] emitter: SignalEmitter<'_>,
        enable: bool,
    ) -> std::result::Result<(), WireError> {
        if !enable {
            tracing::debug!("EnableModules(false) from UID {} ignored", caller.uid);
            return Ok(());
        }
        authorize(
            self.daemon.authority.as_ref(),
            &caller,
            actions::MANAGE_MODULES,
            &OptionBag::new(),
        )
        .await?;

        let loaded = load_configured(&self.registry, &self.daemon);
        if loaded.is_empty() {
            return Ok(());
        }
        serve_managers(connection.object_server(), &loaded).await;
        self.daemon.dispatch(DispatchItem::Rescan);
        self.loaded_modules_changed(&emitter).await?;
        Ok(())
    }

    /// Every block device object
    async fn get_block_devices(
        &self,
        _options: HashMap<String, OwnedValue>,
    ) -> std::result::Result<Vec<OwnedObjectPath>, WireError> {
        Ok(to_wire_paths(&block_devices(&self.daemon.objects))?)
    }

    /// Block objects matching a device specification (`path`, `label`, `uuid`)
    ///
    /// Example:
    /// ```bash
    /// busctl call org.storaged.Storaged /org/storaged/Storaged/Manager \
    ///   org.storaged.Storaged.Manager ResolveDevice a{sv}a{sv} \
    ///   1 label s data 0
    /// ```
    async fn resolve_device(
        &self,
        devspec: HashMap<String, OwnedValue>,
        _options: HashMap<String, OwnedValue>,
    ) -> std::result::Result<Vec<OwnedObjectPath>, WireError> {
        let matches = resolve_device(&self.daemon.objects, &options_from_wire(&devspec))?;
        Ok(to_wire_paths(&matches)?)
    }
}
