// SPDX-License-Identifier: GPL-3.0-only

//! Assembly of the daemon core
//!
//! [`Daemon`] wires the object manager, module registry, dispatcher and
//! housekeeping together over whatever collaborators it is given. It knows
//! nothing about the bus; `main` puts it on one, tests drive it directly.

use std::sync::Arc;

use futures_util::StreamExt;
use storage_contracts::{Authority, BlockLib, DeviceSource};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::claims::ClaimRegistry;
use crate::config::{DaemonConfig, ModulesLoadPreference};
use crate::dispatcher::{DispatchItem, Dispatcher};
use crate::error::Result;
use crate::housekeeping::{HousekeepingScheduler, HousekeepingTargets};
use crate::module::{DaemonHandle, ModuleCatalog, ModuleDescriptor, ModuleRegistry};
use crate::object_manager::ObjectManager;

/// The core, built but not yet running
pub struct Daemon {
    pub handle: DaemonHandle,
    pub registry: Arc<ModuleRegistry>,
    pub housekeeping: HousekeepingTargets,
    dispatcher: Dispatcher,
    dispatch_tx: mpsc::UnboundedSender<DispatchItem>,
    dispatch_rx: mpsc::UnboundedReceiver<DispatchItem>,
}

impl Daemon {
    pub fn new(
        config: DaemonConfig,
        catalog: ModuleCatalog,
        blocklib: BlockLib,
        authority: Arc<dyn Authority>,
        source: Arc<dyn DeviceSource>,
    ) -> Self {
        let config = Arc::new(config);
        let objects = Arc::new(ObjectManager::new(config.wait_for_timeout()));
        let (dispatch_tx, dispatch_rx) = mpsc::unbounded_channel();
        let handle = DaemonHandle::new(
            objects.clone(),
            blocklib,
            authority,
            source.clone(),
            config,
            dispatch_tx.clone(),
        );
        let registry = Arc::new(ModuleRegistry::new(catalog));
        let housekeeping = HousekeepingTargets::default();
        let dispatcher = Dispatcher::new(objects, registry.clone(), source, housekeeping.clone());

        Self {
            handle,
            registry,
            housekeeping,
            dispatcher,
            dispatch_tx,
            dispatch_rx,
        }
    }

    pub fn objects(&self) -> &Arc<ObjectManager> {
        &self.handle.objects
    }

    /// Load the configured modules if the preference (or `force`) says so at startup
    pub fn load_startup_modules(&self, force: bool) -> Vec<Arc<ModuleDescriptor>> {
        let config = &self.handle.config.daemon;
        if !force && config.modules_load_preference == ModulesLoadPreference::OnDemand {
            tracing::info!("Modules are loaded on demand");
            return Vec::new();
        }
        load_configured(&self.registry, &self.handle)
    }

    /// Announce every present device before any live event is taken
    pub fn coldplug(&mut self) -> Result<()> {
        self.dispatcher.coldplug()
    }

    /// Process one item inline, before the dispatcher task exists
    pub fn handle(&mut self, item: DispatchItem) {
        self.dispatcher.handle(item);
    }

    pub fn claims(&self) -> &ClaimRegistry {
        self.dispatcher.claims()
    }

    /// Start the dispatcher, the device event forwarder and housekeeping
    pub fn spawn(self, cancel: CancellationToken) -> RunningDaemon {
        let mut tasks = JoinSet::new();

        tasks.spawn(self.dispatcher.run(self.dispatch_rx, cancel.clone()));
        tasks.spawn(forward_events(
            self.handle.source.clone(),
            self.dispatch_tx.clone(),
            cancel.clone(),
        ));
        tasks.spawn(
            HousekeepingScheduler::new(
                self.housekeeping.clone(),
                self.handle.config.housekeeping_interval(),
                self.dispatch_tx,
            )
            .run(cancel.clone()),
        );

        RunningDaemon {
            handle: self.handle,
            registry: self.registry,
            housekeeping: self.housekeeping,
            cancel,
            tasks,
        }
    }
}

/// Load every configured module that is not loaded yet
pub fn load_configured(
    registry: &ModuleRegistry,
    handle: &DaemonHandle,
) -> Vec<Arc<ModuleDescriptor>> {
    let names = &handle.config.daemon.modules;
    let loaded = registry.load_all(names.iter().map(String::as_str), handle);
    if !loaded.is_empty() {
        tracing::info!(
            "Loaded modules: {}",
            loaded
                .iter()
                .map(|module| module.id.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    loaded
}

async fn forward_events(
    source: Arc<dyn DeviceSource>,
    dispatch: mpsc::UnboundedSender<DispatchItem>,
    cancel: CancellationToken,
) {
    let mut events = match source.events() {
        Ok(events) => events,
        Err(e) => {
            tracing::error!("Cannot listen for device events: {e}");
            return;
        }
    };

    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            event = events.next() => event,
        };
        let Some(event) = event else {
            tracing::warn!("Device event stream ended");
            break;
        };
        if dispatch.send(DispatchItem::Uevent(event)).is_err() {
            break;
        }
    }
    tracing::debug!("Event forwarder stopped");
}

/// The core with its tasks running
pub struct RunningDaemon {
    pub handle: DaemonHandle,
    pub registry: Arc<ModuleRegistry>,
    pub housekeeping: HousekeepingTargets,
    cancel: CancellationToken,
    tasks: JoinSet<()>,
}

impl RunningDaemon {
    pub fn objects(&self) -> &Arc<ObjectManager> {
        &self.handle.objects
    }

    pub fn dispatch(&self, item: DispatchItem) {
        self.handle.dispatch(item);
    }

    /// Cancel every task, wait for them, then tear the modules down
    pub async fn shutdown(mut self) {
        tracing::info!("Shutting down");
        self.cancel.cancel();
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!("Daemon task failed: {e}");
            }
        }
        self.registry.teardown_all();
    }
}
