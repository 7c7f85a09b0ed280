// SPDX-License-Identifier: GPL-3.0-only

//! Instrumented module for routing and housekeeping scenarios
//!
//! Devices carrying a `PROBE_GROUP` property are grouped into one module
//! object per group at `/probe/<group>`. Removing a device marked
//! `PROBE_RETAIN` keeps its group alive while other members remain. Every
//! factory call, housekeeping run and teardown is counted in [`ProbeStats`].

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use storage_service::module::{
    ClaimDecision, DaemonHandle, Housekeeping, Module, ModuleObject, ModuleSetup, ModuleState,
    ObjectFactory,
};
use storage_types::{Device, ObjectPath, PropertyBag, UeventAction};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

pub const PROBE_INTERFACE: &str = "org.storaged.Storaged.Probe";
pub const PROBE_MODULE: &str = "probe";

/// Housekeeping sleeps in steps of this length, polling for cancellation
pub const HOUSEKEEPING_STEP: Duration = Duration::from_millis(100);
const HOUSEKEEPING_STEPS: u32 = 100;

pub fn group_path(group: &str) -> ObjectPath {
    ObjectPath::root().child("probe").child(group)
}

#[derive(Default)]
pub struct ProbeStats {
    pub factory_calls: AtomicUsize,
    pub housekeeping_runs: AtomicUsize,
    pub housekeeping_cancelled: AtomicBool,
    pub torn_down: AtomicBool,
    housekeeping_started: Notify,
}

impl ProbeStats {
    pub fn factory_calls(&self) -> usize {
        self.factory_calls.load(Ordering::SeqCst)
    }

    pub fn housekeeping_runs(&self) -> usize {
        self.housekeeping_runs.load(Ordering::SeqCst)
    }

    /// Resolves once a housekeeping run has started
    pub async fn housekeeping_started(&self) {
        self.housekeeping_started.notified().await;
    }
}

pub struct ProbeModule {
    stats: Arc<ProbeStats>,
}

impl ProbeModule {
    pub fn new(stats: Arc<ProbeStats>) -> Self {
        Self { stats }
    }
}

impl Module for ProbeModule {
    fn id(&self) -> &'static str {
        PROBE_MODULE
    }

    fn init(&self, _daemon: &DaemonHandle) -> storage_service::Result<ModuleSetup> {
        Ok(ModuleSetup::new(self.stats.clone()).with_factory(ProbeFactory {
            stats: self.stats.clone(),
        }))
    }

    fn teardown(&self, _state: &ModuleState) {
        self.stats.torn_down.store(true, Ordering::SeqCst);
    }
}

fn group_of(device: &Device) -> Option<&str> {
    device.property("PROBE_GROUP")
}

struct ProbeFactory {
    stats: Arc<ProbeStats>,
}

impl ObjectFactory for ProbeFactory {
    fn name(&self) -> &'static str {
        "probe-group"
    }

    fn create(&self, device: &Device) -> storage_service::Result<Option<Box<dyn ModuleObject>>> {
        self.stats.factory_calls.fetch_add(1, Ordering::SeqCst);
        let Some(group) = group_of(device) else {
            return Ok(None);
        };
        Ok(Some(Box::new(ProbeObject {
            path: group_path(group),
            group: group.to_string(),
            members: BTreeSet::from([device.syspath().to_string()]),
            housekeeping: Arc::new(ProbeHousekeeping {
                stats: self.stats.clone(),
            }),
        })))
    }
}

struct ProbeObject {
    path: ObjectPath,
    group: String,
    members: BTreeSet<String>,
    housekeeping: Arc<ProbeHousekeeping>,
}

impl ModuleObject for ProbeObject {
    fn path(&self) -> &ObjectPath {
        &self.path
    }

    fn process_uevent(
        &mut self,
        action: UeventAction,
        device: &Device,
    ) -> storage_service::Result<ClaimDecision> {
        if action == UeventAction::Remove || group_of(device) != Some(self.group.as_str()) {
            self.members.remove(device.syspath());
            let retained = device.property("PROBE_RETAIN").is_some() && !self.members.is_empty();
            return Ok(if action == UeventAction::Remove && retained {
                ClaimDecision::Keep
            } else {
                ClaimDecision::Release
            });
        }
        self.members.insert(device.syspath().to_string());
        Ok(ClaimDecision::Keep)
    }

    fn interfaces(&self) -> Vec<(&'static str, PropertyBag)> {
        let mut bag = PropertyBag::new();
        bag.insert("group".into(), self.group.clone().into());
        bag.insert("num_devices".into(), (self.members.len() as u64).into());
        vec![(PROBE_INTERFACE, bag)]
    }

    fn housekeeping(&self) -> Option<Arc<dyn Housekeeping>> {
        Some(self.housekeeping.clone())
    }
}

struct ProbeHousekeeping {
    stats: Arc<ProbeStats>,
}

impl Housekeeping for ProbeHousekeeping {
    fn housekeeping(
        &self,
        _secs_since_last: u64,
        cancel: &CancellationToken,
    ) -> storage_service::Result<()> {
        self.stats.housekeeping_runs.fetch_add(1, Ordering::SeqCst);
        self.stats.housekeeping_started.notify_one();
        for _ in 0..HOUSEKEEPING_STEPS {
            if cancel.is_cancelled() {
                self.stats
                    .housekeeping_cancelled
                    .store(true, Ordering::SeqCst);
                return Ok(());
            }
            std::thread::sleep(HOUSEKEEPING_STEP);
        }
        Ok(())
    }
}
