// SPDX-License-Identifier: GPL-3.0-only

//! zRAM module
//!
//! Creating devices loads the zram kernel module and persists the setup in
//! three kinds of files so that it survives a reboot:
//!
//! - `modules-load.d/zram.conf`: load the module at boot
//! - `modprobe.d/zram.conf`: the number of devices
//! - `zram.conf.d/zram<N>-env`: size and swap flag of each device

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use storage_contracts::wire::options_from_wire;
use storage_contracts::{StorageError, ZramOps};
use storage_macros::with_caller;
use storage_sys::{remove_if_exists, write_atomic};
use storage_types::{
    CallerInfo, ObjectPath, OptionBag, PropertyBag, UeventAction, ZRAM_CONF_NAME, bytes_to_pretty,
    ZramDeviceConfig, modprobe_options, modules_load_directive,
};
use zbus::message::Header as MessageHeader;
use zbus::zvariant::{OwnedObjectPath, OwnedValue};
use zbus::{Connection, interface};

use super::{blocking, device_file, to_wire_path};
use crate::auth::{actions, authorize};
use crate::config::ZramSection;
use crate::error::{Result, ServiceError, WireError};
use crate::interface::{InterfaceEntry, InterfaceInstance};
use crate::module::{DaemonHandle, Module, ModuleSetup};
use crate::object::TypedObject;

pub const BLOCK_ZRAM_INTERFACE: &str = "org.storaged.Storaged.Block.ZRAM";

pub struct ZramModule;

impl Module for ZramModule {
    fn id(&self) -> &'static str {
        "zram"
    }

    fn init(&self, daemon: &DaemonHandle) -> Result<ModuleSetup> {
        let manager = Arc::new(ZramManager::new(daemon.clone()));
        Ok(ModuleSetup::new(manager.clone())
            .with_block_entry(ZramEntry {
                zram: daemon.blocklib.zram.clone(),
            })
            .with_manager(ZramManagerIface { manager }))
    }
}

/// `Block.ZRAM` on every zram device
pub struct ZramEntry {
    zram: Arc<dyn ZramOps>,
}

impl InterfaceEntry for ZramEntry {
    fn type_tag(&self) -> &'static str {
        BLOCK_ZRAM_INTERFACE
    }

    fn check(&self, object: &TypedObject) -> bool {
        object
            .device()
            .is_some_and(|device| device.sysname().starts_with("zram"))
    }

    fn update(
        &self,
        object: &TypedObject,
        _action: Option<UeventAction>,
        instance: &mut InterfaceInstance,
    ) -> bool {
        let Some(device) = object.device() else {
            return false;
        };
        let file = device_file(device);
        let stats = match self.zram.stats(&file) {
            Ok(stats) => stats,
            Err(e) => {
                tracing::warn!("Failed to read zram statistics of {file}: {e}");
                return false;
            }
        };

        let mut bag = PropertyBag::new();
        bag.insert("disksize".into(), stats.disksize.into());
        bag.insert("num_reads".into(), stats.num_reads.into());
        bag.insert("num_writes".into(), stats.num_writes.into());
        bag.insert("comp_algorithm".into(), stats.comp_algorithm.into());
        bag.insert("max_comp_streams".into(), stats.max_comp_streams.into());
        bag.insert("orig_data_size".into(), stats.orig_data_size.into());
        bag.insert("compr_data_size".into(), stats.compr_data_size.into());
        bag.insert("mem_used_total".into(), stats.mem_used_total.into());
        bag.insert("active".into(), stats.active.into());
        instance.replace(bag)
    }
}

fn write_config(config: &ZramSection, sizes: &[u64]) -> std::result::Result<(), StorageError> {
    write_atomic(
        &config.modules_load_dir.join(ZRAM_CONF_NAME),
        modules_load_directive(),
    )?;
    write_atomic(
        &config.modprobe_dir.join(ZRAM_CONF_NAME),
        &modprobe_options(sizes.len()),
    )?;
    for (index, size) in (0u32..).zip(sizes) {
        let device = ZramDeviceConfig::new(index, *size);
        write_atomic(&config.conf_dir.join(device.env_file_name()), &device.render())?;
    }
    Ok(())
}

fn is_env_file(name: &str) -> bool {
    name.strip_prefix("zram")
        .and_then(|rest| rest.strip_suffix("-env"))
        .is_some_and(|index| !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()))
}

fn remove_config(config: &ZramSection) -> std::result::Result<(), StorageError> {
    remove_env_files(&config.conf_dir)?;
    remove_if_exists(&config.modules_load_dir.join(ZRAM_CONF_NAME))?;
    remove_if_exists(&config.modprobe_dir.join(ZRAM_CONF_NAME))?;
    Ok(())
}

fn remove_env_files(dir: &Path) -> std::result::Result<(), StorageError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            return Err(StorageError::failed(format!(
                "Failed to list {}: {e}",
                dir.display()
            )));
        }
    };
    for entry in entries.flatten() {
        if entry.file_name().to_str().is_some_and(is_env_file) {
            remove_if_exists(&entry.path())?;
        }
    }
    Ok(())
}

pub struct ZramManager {
    daemon: DaemonHandle,
    wait_timeout: Duration,
}

impl ZramManager {
    pub fn new(daemon: DaemonHandle) -> Self {
        let wait_timeout = daemon.config.wait_for_timeout();
        Self {
            daemon,
            wait_timeout,
        }
    }

    /// How long `create_devices` waits for the new block objects
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    /// Create one zram device per entry of `sizes` and return their block objects
    pub async fn create_devices(
        &self,
        caller: &CallerInfo,
        sizes: &[u64],
        num_streams: &[u64],
        options: &OptionBag,
    ) -> Result<Vec<ObjectPath>> {
        authorize(
            self.daemon.authority.as_ref(),
            caller,
            actions::MANAGE_ZRAM,
            options,
        )
        .await?;

        if sizes.is_empty() {
            return Err(ServiceError::InvalidArgument(
                "At least one device size is required".to_string(),
            ));
        }
        if sizes.len() != num_streams.len() {
            return Err(ServiceError::InvalidArgument(format!(
                "Got {} sizes but {} stream counts",
                sizes.len(),
                num_streams.len()
            )));
        }
        if sizes.contains(&0) {
            return Err(ServiceError::InvalidArgument(
                "Device size must not be zero".to_string(),
            ));
        }

        let total = sizes.iter().fold(0u64, |total, size| total.saturating_add(*size));
        tracing::info!(
            "Creating {} zram devices ({}) for UID {}",
            sizes.len(),
            bytes_to_pretty(total, false),
            caller.uid
        );
        let zram = self.daemon.blocklib.zram.clone();
        let (device_sizes, streams) = (sizes.to_vec(), num_streams.to_vec());
        blocking(move || zram.create_devices(&device_sizes, &streams)).await?;

        let config = self.daemon.config.zram.clone();
        let device_sizes = sizes.to_vec();
        blocking(move || write_config(&config, &device_sizes)).await?;

        let expected: Vec<ObjectPath> = (0u32..)
            .zip(sizes)
            .map(|(index, size)| {
                ObjectPath::for_block_device(&ZramDeviceConfig::new(index, *size).device_file())
            })
            .collect();
        self.daemon
            .objects
            .wait_until(
                |objects| {
                    expected
                        .iter()
                        .all(|path| objects.contains(path))
                        .then(|| expected.clone())
                },
                Some(self.wait_timeout),
            )
            .await
            .map_err(|e| {
                ServiceError::timeout("Error waiting for ZRAM objects after creating", e)
            })
    }

    /// Remove every zram device and the persisted configuration
    pub async fn destroy_devices(&self, caller: &CallerInfo, options: &OptionBag) -> Result<()> {
        authorize(
            self.daemon.authority.as_ref(),
            caller,
            actions::MANAGE_ZRAM,
            options,
        )
        .await?;

        tracing::info!("Destroying zram devices for UID {}", caller.uid);
        let zram = self.daemon.blocklib.zram.clone();
        blocking(move || zram.destroy_devices()).await?;

        let config = self.daemon.config.zram.clone();
        blocking(move || remove_config(&config)).await
    }
}

#[derive(Clone)]
pub struct ZramManagerIface {
    manager: Arc<ZramManager>,
}

#[interface(name = "org.storaged.Storaged.Manager.ZRAM")]
impl ZramManagerIface {
    /// Create zram devices of the given sizes, returning their block objects
    ///
    /// Example:
    /// ```bash
    /// busctl call org.storaged.Storaged /org/storaged/Storaged/Manager \
    ///   org.storaged.Storaged.Manager.ZRAM \
    ///   CreateDevices atata{sv} 1 67108864 1 2 0
    /// ```
    #[with_caller]
    async fn create_devices(
        &self,
        #[zbus(connection)] _connection: &Connection,
        #[zbus(header)] _header: MessageHeader<'_>,
        sizes: Vec<u64>,
        num_streams: Vec<u64>,
        options: HashMap<String, OwnedValue>,
    ) -> std::result::Result<Vec<OwnedObjectPath>, WireError> {
        let paths = self
            .manager
            .create_devices(&caller, &sizes, &num_streams, &options_from_wire(&options))
            .await?;
        Ok(paths
            .iter()
            .map(to_wire_path)
            .collect::<Result<Vec<_>>>()?)
    }

    /// Destroy every zram device
    #[with_caller]
    async fn destroy_devices(
        &self,
        #[zbus(connection)] _connection: &Connection,
        #[zbus(header)] _header: MessageHeader<'_>,
        options: HashMap<String, OwnedValue>,
    ) -> std::result::Result<(), WireError> {
        self.manager
            .destroy_devices(&caller, &options_from_wire(&options))
            .await?;
        Ok(())
    }
}
