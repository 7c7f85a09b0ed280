// SPDX-License-Identifier: GPL-3.0-only

//! Pluggable modules
//!
//! A module is loaded once by name. Its `init` returns a [`ModuleSetup`]:
//! the module-owned state plus the entry points the core calls into
//! (block and drive interface entries, virtual-object factories and manager
//! interfaces). Modules are never unloaded while the daemon runs.

pub mod catalog;
pub mod registry;

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use storage_contracts::{Authority, BlockLib, DeviceSource};
use storage_types::{Device, ObjectPath, PropertyBag, UeventAction};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use zbus::object_server::{Interface, ObjectServer};

use crate::config::DaemonConfig;
use crate::dispatcher::DispatchItem;
use crate::error::Result;
use crate::interface::InterfaceEntry;
use crate::object_manager::ObjectManager;

pub use catalog::ModuleCatalog;
pub use registry::{ModuleDescriptor, ModuleLoadError, ModuleRegistry};

/// Opaque per-module state, owned by the module and shared with its entry points
pub type ModuleState = Arc<dyn Any + Send + Sync>;

pub trait Module: Send + Sync {
    fn id(&self) -> &'static str;

    fn init(&self, daemon: &DaemonHandle) -> Result<ModuleSetup>;

    /// Called once at shutdown, in reverse load order
    fn teardown(&self, _state: &ModuleState) {}
}

/// What the core hands to modules: shared services, never the registry itself
#[derive(Clone)]
pub struct DaemonHandle {
    pub objects: Arc<ObjectManager>,
    pub blocklib: BlockLib,
    pub authority: Arc<dyn Authority>,
    pub source: Arc<dyn DeviceSource>,
    pub config: Arc<DaemonConfig>,
    dispatch: mpsc::UnboundedSender<DispatchItem>,
}

impl DaemonHandle {
    pub fn new(
        objects: Arc<ObjectManager>,
        blocklib: BlockLib,
        authority: Arc<dyn Authority>,
        source: Arc<dyn DeviceSource>,
        config: Arc<DaemonConfig>,
        dispatch: mpsc::UnboundedSender<DispatchItem>,
    ) -> Self {
        Self {
            objects,
            blocklib,
            authority,
            source,
            config,
            dispatch,
        }
    }

    /// Queue work for the dispatcher task
    pub fn dispatch(&self, item: DispatchItem) {
        if self.dispatch.send(item).is_err() {
            tracing::warn!("Dispatcher is gone, dropping request");
        }
    }
}

/// Result of a module's `init`
pub struct ModuleSetup {
    pub state: ModuleState,
    pub block_entries: Vec<Arc<dyn InterfaceEntry>>,
    pub drive_entries: Vec<Arc<dyn InterfaceEntry>>,
    pub factories: Vec<Arc<dyn ObjectFactory>>,
    pub managers: Vec<Arc<dyn ManagerExport>>,
}

impl ModuleSetup {
    pub fn new(state: ModuleState) -> Self {
        Self {
            state,
            block_entries: Vec::new(),
            drive_entries: Vec::new(),
            factories: Vec::new(),
            managers: Vec::new(),
        }
    }

    pub fn with_block_entry(mut self, entry: impl InterfaceEntry + 'static) -> Self {
        self.block_entries.push(Arc::new(entry));
        self
    }

    pub fn with_drive_entry(mut self, entry: impl InterfaceEntry + 'static) -> Self {
        self.drive_entries.push(Arc::new(entry));
        self
    }

    pub fn with_factory(mut self, factory: impl ObjectFactory + 'static) -> Self {
        self.factories.push(Arc::new(factory));
        self
    }

    pub fn with_manager<I>(mut self, interface: I) -> Self
    where
        I: Interface + Clone,
    {
        self.managers.push(Arc::new(ServedInterface(interface)));
        self
    }
}

/// Answer of a module object to an event on a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimDecision {
    /// The object owns the device
    Keep,
    /// The object does not (or no longer) want the device
    Release,
    /// The object is gone as a whole, whatever else it claims
    Dead,
}

/// Virtual object contributed by a module, covering one or more devices
pub trait ModuleObject: Send + Sync {
    fn path(&self) -> &ObjectPath;

    fn process_uevent(&mut self, action: UeventAction, device: &Device) -> Result<ClaimDecision>;

    /// Interfaces to export and their current properties
    fn interfaces(&self) -> Vec<(&'static str, PropertyBag)>;

    fn housekeeping(&self) -> Option<Arc<dyn Housekeeping>> {
        None
    }
}

/// Creates module objects for devices nobody claims yet
pub trait ObjectFactory: Send + Sync {
    fn name(&self) -> &'static str;

    fn create(&self, device: &Device) -> Result<Option<Box<dyn ModuleObject>>>;
}

/// Periodic refresh that may block on I/O; `cancel` must be polled
pub trait Housekeeping: Send + Sync {
    fn housekeeping(&self, secs_since_last: u64, cancel: &CancellationToken) -> Result<()>;
}

/// A manager interface served at the manager path
#[async_trait]
pub trait ManagerExport: Send + Sync {
    fn interface_name(&self) -> String;

    async fn serve(&self, server: &ObjectServer, path: &ObjectPath) -> zbus::Result<bool>;
}

struct ServedInterface<I>(I);

#[async_trait]
impl<I> ManagerExport for ServedInterface<I>
where
    I: Interface + Clone,
{
    fn interface_name(&self) -> String {
        I::name().to_string()
    }

    async fn serve(&self, server: &ObjectServer, path: &ObjectPath) -> zbus::Result<bool> {
        server.at(path.as_str(), self.0.clone()).await
    }
}
