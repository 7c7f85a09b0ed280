// SPDX-License-Identifier: GPL-3.0-only

//! storaged - D-Bus daemon exporting block devices and storage modules
//!
//! Runs as root on the system bus. Modules are loaded at startup or on the
//! first `EnableModules` call, depending on the configuration.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use storage_contracts::BUS_NAME;
use storage_service::adapters::ToolsBlockLib;
use storage_service::auth::PolkitAuthority;
use storage_service::bus::{ManagerIface, ObjectManagerIface, SignalBridge, serve_managers};
use storage_service::config::DEFAULT_CONFIG_PATH;
use storage_service::{Daemon, DaemonConfig, ModuleCatalog};
use storage_sys::SysfsDeviceSource;
use storage_types::ObjectPath;
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt};
use zbus::connection::Builder as ConnectionBuilder;

#[derive(Debug, Parser)]
#[command(name = "storaged", version, about = "Storage management daemon")]
struct Args {
    /// Configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Load every configured module at startup, whatever the preference says
    #[arg(long)]
    force_load_modules: bool,

    /// Log at debug level
    #[arg(long)]
    debug: bool,

    /// Use the session bus instead of the system bus
    #[arg(long)]
    session: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.debug {
        "storage_service=debug,storage_sys=debug,info"
    } else {
        "storage_service=info,warn"
    };
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting storaged v{}", env!("CARGO_PKG_VERSION"));

    if !args.session && unsafe { libc::geteuid() } != 0 {
        tracing::error!("storaged must run as root");
        anyhow::bail!("Service must run with root privileges");
    }

    let config = DaemonConfig::load(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;

    let connection = if args.session {
        ConnectionBuilder::session()?.build().await?
    } else {
        ConnectionBuilder::system()?.build().await?
    };

    let source = Arc::new(SysfsDeviceSource::new().context("Failed to open sysfs")?);
    let blocklib = ToolsBlockLib::new(&config).into_blocklib();
    let authority = Arc::new(PolkitAuthority::new(connection.clone()));

    let mut daemon = Daemon::new(config, ModuleCatalog::builtin(), blocklib, authority, source);
    let loaded = daemon.load_startup_modules(args.force_load_modules);
    if let Err(e) = daemon.coldplug() {
        tracing::warn!("Coldplug failed: {e}");
    }

    let server = connection.object_server();
    server
        .at(
            ObjectPath::root().as_str(),
            ObjectManagerIface::new(daemon.objects().clone()),
        )
        .await?;
    server
        .at(
            ObjectPath::manager().as_str(),
            ManagerIface::new(daemon.registry.clone(), daemon.handle.clone()),
        )
        .await?;
    let served = serve_managers(server, &loaded).await;
    tracing::info!("Serving {served} module manager interfaces");

    let cancel = CancellationToken::new();
    let bridge = SignalBridge::new(connection.clone(), daemon.objects().subscribe());
    let bridge_task = tokio::spawn(bridge.run(cancel.clone()));
    let running = daemon.spawn(cancel.clone());

    connection
        .request_name(BUS_NAME)
        .await
        .with_context(|| format!("Failed to acquire {BUS_NAME}"))?;
    tracing::info!("Service registered as {BUS_NAME}, waiting for requests...");

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = terminate.recv() => {}
    }
    tracing::info!("Received shutdown signal");

    running.shutdown().await;
    if let Err(e) = bridge_task.await {
        tracing::error!("Signal bridge failed: {e}");
    }
    tracing::info!("storaged shutting down");
    Ok(())
}
