// SPDX-License-Identifier: GPL-3.0-only

//! Dummy module
//!
//! Collects every bound loop device into the single object `/dummy/loops`.
//! Mostly useful as a small, complete example of a module object with
//! housekeeping.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use storage_contracts::LoopOps;
use storage_types::{Device, ObjectPath, PropertyBag, UeventAction};
use tokio_util::sync::CancellationToken;

use super::device_file;
use crate::error::Result;
use crate::module::{
    ClaimDecision, DaemonHandle, Housekeeping, Module, ModuleObject, ModuleSetup, ObjectFactory,
};

pub const LOOP_POOL_INTERFACE: &str = "org.storaged.Storaged.Dummy.LoopPool";

pub fn loop_pool_path() -> ObjectPath {
    ObjectPath::root().child("dummy").child("loops")
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LoopMember {
    device_file: String,
    backing_file: Option<String>,
}

/// Members of one pool object keyed by syspath; shared with its housekeeping
#[derive(Default)]
struct LoopPool {
    members: Mutex<BTreeMap<String, LoopMember>>,
}

impl LoopPool {
    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, LoopMember>> {
        self.members.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pub struct DummyModule;

impl Module for DummyModule {
    fn id(&self) -> &'static str {
        "dummy"
    }

    fn init(&self, daemon: &DaemonHandle) -> Result<ModuleSetup> {
        Ok(ModuleSetup::new(Arc::new(())).with_factory(LoopPoolFactory {
            loops: daemon.blocklib.loops.clone(),
        }))
    }
}

fn backing_file(device: &Device) -> Option<&str> {
    if !device.sysname().starts_with("loop") {
        return None;
    }
    device
        .attribute("loop/backing_file")
        .map(str::trim)
        .filter(|file| !file.is_empty())
}

pub struct LoopPoolFactory {
    loops: Arc<dyn LoopOps>,
}

impl ObjectFactory for LoopPoolFactory {
    fn name(&self) -> &'static str {
        "loop-pool"
    }

    fn create(&self, device: &Device) -> Result<Option<Box<dyn ModuleObject>>> {
        if backing_file(device).is_none() {
            return Ok(None);
        }
        let mut object = LoopPoolObject {
            path: loop_pool_path(),
            refresh: Arc::new(LoopRefresh {
                pool: Arc::new(LoopPool::default()),
                loops: self.loops.clone(),
            }),
        };
        object.process_uevent(UeventAction::Add, device)?;
        Ok(Some(Box::new(object)))
    }
}

pub struct LoopPoolObject {
    path: ObjectPath,
    refresh: Arc<LoopRefresh>,
}

impl ModuleObject for LoopPoolObject {
    fn path(&self) -> &ObjectPath {
        &self.path
    }

    fn process_uevent(&mut self, action: UeventAction, device: &Device) -> Result<ClaimDecision> {
        let mut members = self.refresh.pool.lock();
        match (action, backing_file(device)) {
            (UeventAction::Add | UeventAction::Change, Some(backing)) => {
                members.insert(
                    device.syspath().to_string(),
                    LoopMember {
                        device_file: device_file(device),
                        backing_file: Some(backing.to_string()),
                    },
                );
                Ok(ClaimDecision::Keep)
            }
            _ => {
                members.remove(device.syspath());
                Ok(ClaimDecision::Release)
            }
        }
    }

    fn interfaces(&self) -> Vec<(&'static str, PropertyBag)> {
        let members = self.refresh.pool.lock();
        let devices: Vec<String> = members
            .values()
            .map(|member| member.device_file.clone())
            .collect();
        let backing_files: Vec<String> = members
            .values()
            .filter_map(|member| member.backing_file.clone())
            .collect();

        let mut bag = PropertyBag::new();
        bag.insert("num_devices".into(), (members.len() as u64).into());
        bag.insert("devices".into(), devices.into());
        bag.insert("backing_files".into(), backing_files.into());
        vec![(LOOP_POOL_INTERFACE, bag)]
    }

    fn housekeeping(&self) -> Option<Arc<dyn Housekeeping>> {
        Some(self.refresh.clone())
    }
}

/// Re-reads each member's backing file
struct LoopRefresh {
    pool: Arc<LoopPool>,
    loops: Arc<dyn LoopOps>,
}

impl Housekeeping for LoopRefresh {
    fn housekeeping(&self, secs_since_last: u64, cancel: &CancellationToken) -> Result<()> {
        let snapshot: Vec<(String, String)> = self
            .pool
            .lock()
            .iter()
            .map(|(syspath, member)| (syspath.clone(), member.device_file.clone()))
            .collect();
        tracing::debug!(
            "Refreshing {} loop devices, {secs_since_last}s since last run",
            snapshot.len()
        );

        for (syspath, file) in snapshot {
            if cancel.is_cancelled() {
                tracing::debug!("Loop refresh cancelled");
                return Ok(());
            }
            // No lock across the losetup call
            let info = match self.loops.info(&file) {
                Ok(info) => info,
                Err(e) => {
                    tracing::warn!("Failed to refresh {file}: {e}");
                    continue;
                }
            };
            if let Some(member) = self.pool.lock().get_mut(&syspath) {
                member.backing_file = info.backing_file;
            }
        }
        Ok(())
    }
}
