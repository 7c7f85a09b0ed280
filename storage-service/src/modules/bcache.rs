// SPDX-License-Identifier: GPL-3.0-only

//! Bcache module

use std::collections::HashMap;
use std::sync::Arc;

use storage_contracts::BcacheOps;
use storage_contracts::wire::options_from_wire;
use storage_macros::with_caller;
use storage_types::{CallerInfo, ObjectPath, OptionBag, PropertyBag, UeventAction};
use zbus::message::Header as MessageHeader;
use zbus::zvariant::{OwnedObjectPath, OwnedValue};
use zbus::{Connection, interface};

use super::{blocking, device_file, from_wire_path, to_wire_path};
use crate::auth::{actions, authorize};
use crate::core_interfaces::block_device_file;
use crate::error::{Result, ServiceError, WireError};
use crate::interface::{InterfaceEntry, InterfaceInstance};
use crate::module::{DaemonHandle, Module, ModuleSetup};
use crate::object::TypedObject;

pub const BLOCK_BCACHE_INTERFACE: &str = "org.storaged.Storaged.Block.Bcache";

pub struct BcacheModule;

impl Module for BcacheModule {
    fn id(&self) -> &'static str {
        "bcache"
    }

    fn init(&self, daemon: &DaemonHandle) -> Result<ModuleSetup> {
        let manager = Arc::new(BcacheManager::new(daemon.clone()));
        Ok(ModuleSetup::new(manager.clone())
            .with_block_entry(BcacheEntry {
                bcache: daemon.blocklib.bcache.clone(),
            })
            .with_manager(BcacheManagerIface { manager }))
    }
}

pub struct BcacheEntry {
    bcache: Arc<dyn BcacheOps>,
}

impl InterfaceEntry for BcacheEntry {
    fn type_tag(&self) -> &'static str {
        BLOCK_BCACHE_INTERFACE
    }

    fn check(&self, object: &TypedObject) -> bool {
        object
            .device()
            .is_some_and(|device| device.sysname().starts_with("bcache"))
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
        let stats = match self.bcache.stats(&file) {
            Ok(stats) => stats,
            Err(e) => {
                tracing::warn!("Failed to read bcache statistics of {file}: {e}");
                return false;
            }
        };

        let mut bag = PropertyBag::new();
        bag.insert("State".into(), stats.state.into());
        bag.insert("Mode".into(), stats.mode.into());
        bag.insert("BlockSize".into(), stats.block_size.into());
        bag.insert("CacheSize".into(), stats.cache_size.into());
        bag.insert("CacheUsed".into(), stats.cache_used.into());
        bag.insert("Hits".into(), stats.hits.into());
        bag.insert("Misses".into(), stats.misses.into());
        bag.insert("BypassHits".into(), stats.bypass_hits.into());
        bag.insert("BypassMisses".into(), stats.bypass_misses.into());
        instance.replace(bag)
    }
}

pub struct BcacheManager {
    daemon: DaemonHandle,
}

impl BcacheManager {
    pub fn new(daemon: DaemonHandle) -> Self {
        Self { daemon }
    }

    /// Put `cache` in front of `backing` and return the new bcache block object
    pub async fn bcache_create(
        &self,
        caller: &CallerInfo,
        backing: &ObjectPath,
        cache: &ObjectPath,
        options: &OptionBag,
    ) -> Result<ObjectPath> {
        authorize(
            self.daemon.authority.as_ref(),
            caller,
            actions::MANAGE_BCACHE,
            options,
        )
        .await?;

        if backing == cache {
            return Err(ServiceError::InvalidArgument(
                "Backing and cache device must differ".to_string(),
            ));
        }
        let backing_device = block_device_file(&self.daemon.objects, backing)?;
        let cache_device = block_device_file(&self.daemon.objects, cache)?;

        tracing::info!(
            "Creating bcache device from {backing_device} and {cache_device} for UID {}",
            caller.uid
        );
        let bcache = self.daemon.blocklib.bcache.clone();
        let created = blocking(move || bcache.create(&backing_device, &cache_device)).await?;

        let path = ObjectPath::for_block_device(&created);
        self.daemon
            .objects
            .wait_for(|object| object.path == path, None)
            .await
            .map_err(|e| ServiceError::timeout("Error waiting for bcache object after creating", e))?;
        Ok(path)
    }
}

#[derive(Clone)]
pub struct BcacheManagerIface {
    manager: Arc<BcacheManager>,
}

#[interface(name = "org.storaged.Storaged.Manager.Bcache")]
impl BcacheManagerIface {
    /// Create a bcache device
    ///
    /// Example:
    /// ```bash
    /// busctl call org.storaged.Storaged /org/storaged/Storaged/Manager \
    ///   org.storaged.Storaged.Manager.Bcache BcacheCreate ooa{sv} \
    ///   /org/storaged/Storaged/block_devices/sdb \
    ///   /org/storaged/Storaged/block_devices/nvme0n1 0
    /// ```
    #[with_caller]
    async fn bcache_create(
        &self,
        #[zbus(connection)] _connection: &Connection,
        #[zbus(header)] _header: MessageHeader<'_>,
        backing: OwnedObjectPath,
        cache: OwnedObjectPath,
        options: HashMap<String, OwnedValue>,
    ) -> std::result::Result<OwnedObjectPath, WireError> {
        let backing = from_wire_path(backing)?;
        let cache = from_wire_path(cache)?;
        let path = self
            .manager
            .bcache_create(&caller, &backing, &cache, &options_from_wire(&options))
            .await?;
        Ok(to_wire_path(&path)?)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use storage_contracts::StorageError;
    use storage_types::{BcacheStats, Device, PropertyValue};

    use super::*;
    use crate::attacher::sync_interfaces;
    use crate::config::DaemonConfig;
    use crate::core_interfaces::BLOCK_INTERFACE;
    use crate::object_manager::ExportedObject;
    use crate::test_support::{daemon_with, root_caller, unsupported_blocklib};

    struct FakeBcache;

    impl BcacheOps for FakeBcache {
        fn stats(&self, _device: &str) -> std::result::Result<BcacheStats, StorageError> {
            Ok(BcacheStats {
                state: "clean".to_string(),
                mode: "writethrough".to_string(),
                hits: 12,
                ..Default::default()
            })
        }

        fn create(&self, _backing: &str, _cache: &str) -> std::result::Result<String, StorageError> {
            Ok("/dev/bcache0".to_string())
        }
    }

    fn block(name: &str) -> ExportedObject {
        let mut block = PropertyBag::new();
        block.insert("Device".into(), format!("/dev/{name}").into());
        ExportedObject::new(
            ObjectPath::for_block_device(name),
            BTreeMap::from([(BLOCK_INTERFACE.to_string(), block)]),
        )
    }

    #[test]
    fn statistics_are_exported() {
        let entries: Vec<Arc<dyn InterfaceEntry>> =
            vec![Arc::new(BcacheEntry { bcache: Arc::new(FakeBcache) })];
        let device = Device::builder("/sys/devices/virtual/block/bcache0")
            .device_file("/dev/bcache0")
            .build();
        let mut object = TypedObject::block(Arc::new(device), None);
        sync_interfaces(&mut object, Some(UeventAction::Add), &entries);

        let bag = &object.interfaces[BLOCK_BCACHE_INTERFACE].properties;
        assert_eq!(bag["State"], PropertyValue::from("clean"));
        assert_eq!(bag["Hits"], PropertyValue::U64(12));
    }

    #[tokio::test]
    async fn create_waits_for_the_new_block_object() {
        let mut blocklib = unsupported_blocklib();
        blocklib.bcache = Arc::new(FakeBcache);
        let daemon = daemon_with(blocklib, DaemonConfig::default());
        daemon.objects.register(block("sdb")).unwrap();
        daemon.objects.register(block("nvme0n1")).unwrap();
        daemon.objects.flush();
        let manager = BcacheManager::new(daemon.clone());

        let objects = daemon.objects.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            objects.register(block("bcache0")).unwrap();
            objects.flush();
        });
        let path = manager
            .bcache_create(
                &root_caller(),
                &ObjectPath::for_block_device("sdb"),
                &ObjectPath::for_block_device("nvme0n1"),
                &OptionBag::new(),
            )
            .await
            .unwrap();
        assert_eq!(path, ObjectPath::for_block_device("/dev/bcache0"));
    }

    #[tokio::test]
    async fn unknown_backing_device_is_a_lookup_error() {
        let manager = BcacheManager::new(crate::test_support::daemon_handle());
        let result = manager
            .bcache_create(
                &root_caller(),
                &ObjectPath::for_block_device("sdx"),
                &ObjectPath::for_block_device("sdy"),
                &OptionBag::new(),
            )
            .await;
        assert!(matches!(result, Err(ServiceError::DeviceLookup(_))));
    }
}
