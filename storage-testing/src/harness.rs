// SPDX-License-Identifier: GPL-3.0-only

//! A daemon over fakes, driven inline or as running tasks

use std::sync::Arc;
use std::time::Duration;

use storage_service::config::ModulesLoadPreference;
use storage_service::{
    BusEvent, Daemon, DaemonConfig, DaemonHandle, DispatchItem, ExportedObject, ModuleCatalog,
    ObjectManager, RunningDaemon,
};
use storage_types::{CallerInfo, Device, ObjectPath, Uevent};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use crate::errors::{Result, TestingError};
use crate::fakes::{ChannelDeviceSource, FakeAuthority, FakeBlockLib};
use crate::probe::{PROBE_MODULE, ProbeModule, ProbeStats};
use crate::recorder::Recorder;

/// Collaborators shared by the inline and the running daemon
pub struct Fakes {
    pub source: Arc<ChannelDeviceSource>,
    pub blocklib: Arc<FakeBlockLib>,
    pub authority: Arc<FakeAuthority>,
    pub probe: Arc<ProbeStats>,
    /// Root of the zRAM configuration directories
    pub state_dir: TempDir,
}

pub struct TestDaemonBuilder {
    modules: Vec<String>,
    present: Vec<Device>,
    housekeeping_interval_secs: u64,
    wait_for_timeout_secs: u64,
    catalog: ModuleCatalog,
}

impl TestDaemonBuilder {
    /// Modules to load at startup, in this order
    pub fn modules(mut self, modules: &[&str]) -> Self {
        self.modules = modules.iter().map(ToString::to_string).collect();
        self
    }

    /// Devices present before the daemon starts, picked up by coldplug
    pub fn present(mut self, devices: Vec<Device>) -> Self {
        self.present = devices;
        self
    }

    pub fn housekeeping_interval_secs(mut self, secs: u64) -> Self {
        self.housekeeping_interval_secs = secs;
        self
    }

    pub fn wait_for_timeout_secs(mut self, secs: u64) -> Self {
        self.wait_for_timeout_secs = secs;
        self
    }

    /// Adjust the module catalog, e.g. to add a module that fails to load
    pub fn catalog(mut self, adjust: impl FnOnce(ModuleCatalog) -> ModuleCatalog) -> Self {
        self.catalog = adjust(self.catalog);
        self
    }

    pub fn build(self) -> Result<TestDaemon> {
        let state_dir = tempfile::tempdir()?;
        let mut config = DaemonConfig::default();
        config.daemon.modules = self.modules;
        config.daemon.modules_load_preference = ModulesLoadPreference::OnStartup;
        config.daemon.housekeeping_interval_secs = self.housekeeping_interval_secs;
        config.daemon.wait_for_timeout_secs = self.wait_for_timeout_secs;
        config.zram.modules_load_dir = state_dir.path().join("modules-load.d");
        config.zram.modprobe_dir = state_dir.path().join("modprobe.d");
        config.zram.conf_dir = state_dir.path().join("zram.conf.d");

        let source = Arc::new(ChannelDeviceSource::new(self.present));
        let blocklib = Arc::new(FakeBlockLib::new(source.clone()));
        let authority = Arc::new(FakeAuthority::default());
        let probe = Arc::new(ProbeStats::default());

        let probe_stats = probe.clone();
        let catalog = self.catalog.with(PROBE_MODULE, move || {
            Arc::new(ProbeModule::new(probe_stats.clone()))
        });

        let mut daemon = Daemon::new(
            config,
            catalog,
            blocklib.blocklib(),
            authority.clone(),
            source.clone(),
        );
        let recorder = Recorder::new(daemon.objects());
        daemon.load_startup_modules(false);
        daemon.coldplug()?;

        Ok(TestDaemon {
            daemon,
            recorder,
            fakes: Fakes {
                source,
                blocklib,
                authority,
                probe,
                state_dir,
            },
        })
    }
}

/// Daemon whose events are handled inline, one call at a time
pub struct TestDaemon {
    pub daemon: Daemon,
    pub recorder: Recorder,
    pub fakes: Fakes,
}

impl TestDaemon {
    pub fn builder() -> TestDaemonBuilder {
        TestDaemonBuilder {
            modules: Vec::new(),
            present: Vec::new(),
            housekeeping_interval_secs: 600,
            wait_for_timeout_secs: 30,
            catalog: ModuleCatalog::builtin(),
        }
    }

    /// Daemon with `modules` loaded and no devices
    pub fn with_modules(modules: &[&str]) -> Result<Self> {
        Self::builder().modules(modules).build()
    }

    pub fn objects(&self) -> &Arc<ObjectManager> {
        self.daemon.objects()
    }

    pub fn object(&self, path: &ObjectPath) -> Option<Arc<ExportedObject>> {
        self.objects().get(path)
    }

    /// Handle one event to completion and return the notifications it caused
    pub fn emit(&mut self, event: Uevent) -> Vec<BusEvent> {
        self.fakes.source.remember(&event);
        self.daemon.handle(DispatchItem::Uevent(event));
        self.recorder.drain()
    }

    pub fn daemon_handle(&self) -> DaemonHandle {
        self.daemon.handle.clone()
    }

    /// Start the dispatcher, event forwarding and housekeeping tasks
    pub fn spawn(self) -> RunningTestDaemon {
        let cancel = CancellationToken::new();
        RunningTestDaemon {
            running: self.daemon.spawn(cancel),
            recorder: self.recorder,
            fakes: self.fakes,
        }
    }
}

/// Daemon running its tasks; events go through the device source
pub struct RunningTestDaemon {
    pub running: RunningDaemon,
    pub recorder: Recorder,
    pub fakes: Fakes,
}

impl RunningTestDaemon {
    pub fn objects(&self) -> &Arc<ObjectManager> {
        self.running.objects()
    }

    pub fn daemon_handle(&self) -> DaemonHandle {
        self.running.handle.clone()
    }

    pub fn emit(&self, event: Uevent) {
        self.fakes.source.emit(event);
    }

    /// Wait until `path` is exported
    pub async fn exported(&self, path: &ObjectPath, timeout: Duration) -> Result<Arc<ExportedObject>> {
        self.objects()
            .wait_for(|object| &object.path == path, Some(timeout))
            .await
            .map_err(|_| TestingError::Timeout {
                what: path.to_string(),
                timeout,
            })
    }

    pub async fn shutdown(self) -> Fakes {
        self.running.shutdown().await;
        self.fakes
    }
}

/// Caller with uid 0, as root tools would call in
pub fn root_caller() -> CallerInfo {
    CallerInfo::new(0, 4242, Some("root".to_string()), ":1.42")
}

/// Unprivileged desktop user
pub fn user_caller() -> CallerInfo {
    CallerInfo::new(1000, 4343, Some("alice".to_string()), ":1.43")
}
