// SPDX-License-Identifier: GPL-3.0-only

use std::sync::Arc;

use async_trait::async_trait;
use storage_service::module::ModuleSetup;
use storage_service::modules::btrfs::FILESYSTEM_BTRFS_INTERFACE;
use storage_service::{BusEvent, DaemonHandle, DispatchItem, Module, ServiceError};
use storage_testing::{TestDaemon, fixtures};
use storage_types::{BtrfsInfo, ObjectPath, Uevent};

use crate::Scenario;

/// Module whose initialization always fails
struct Broken;

impl Module for Broken {
    fn id(&self) -> &'static str {
        "broken"
    }

    fn init(&self, _daemon: &DaemonHandle) -> storage_service::Result<ModuleSetup> {
        Err(ServiceError::Config("broken.conf is unreadable".to_string()))
    }
}

pub struct InvariantsFailedInitIsAbsent;

#[async_trait]
impl Scenario for InvariantsFailedInitIsAbsent {
    fn id(&self) -> &'static str {
        "invariants.failed_init_is_absent"
    }

    fn suite(&self) -> &'static str {
        "invariants"
    }

    async fn execute(&self) -> storage_testing::errors::Result<()> {
        let mut bench = TestDaemon::builder()
            .modules(&["broken", "btrfs"])
            .catalog(|catalog| catalog.with("broken", || Arc::new(Broken)))
            .build()?;
        let registry = bench.daemon.registry.clone();

        assert_eq!(registry.loaded_names(), vec!["btrfs"]);
        assert!(registry.state_of("broken").is_none());
        assert!(registry.supported().contains(&"broken".to_string()));

        // The modules that did load keep working
        bench.fakes.blocklib.set_btrfs("/dev/sdb1", BtrfsInfo::default());
        bench.emit(Uevent::add(fixtures::block("sdb1", "btrfs")));
        let object = bench
            .object(&ObjectPath::for_block_device("/dev/sdb1"))
            .expect("sdb1 is exported");
        assert!(object.has_interface(FILESYSTEM_BTRFS_INTERFACE));
        Ok(())
    }
}

pub struct InvariantsRescanAfterLateLoad;

#[async_trait]
impl Scenario for InvariantsRescanAfterLateLoad {
    fn id(&self) -> &'static str {
        "invariants.rescan_after_late_load"
    }

    fn suite(&self) -> &'static str {
        "invariants"
    }

    async fn execute(&self) -> storage_testing::errors::Result<()> {
        let mut bench = TestDaemon::with_modules(&[])?;
        bench.fakes.blocklib.set_btrfs("/dev/sdb1", BtrfsInfo::default());
        let path = ObjectPath::for_block_device("/dev/sdb1");
        bench.emit(Uevent::add(fixtures::block("sdb1", "btrfs")));
        assert!(!bench.object(&path).expect("sdb1").has_interface(FILESYSTEM_BTRFS_INTERFACE));

        let handle = bench.daemon_handle();
        bench
            .daemon
            .registry
            .load("btrfs", &handle)
            .map_err(ServiceError::from)?;
        bench.daemon.handle(DispatchItem::Rescan);

        let events = bench.recorder.drain();
        assert!(events.iter().any(|event| matches!(
            event,
            BusEvent::InterfacesAdded { path: added, interfaces }
                if added == &path && interfaces.contains_key(FILESYSTEM_BTRFS_INTERFACE)
        )));
        assert!(bench.object(&path).expect("sdb1").has_interface(FILESYSTEM_BTRFS_INTERFACE));
        Ok(())
    }
}
