// SPDX-License-Identifier: GPL-3.0-only

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, RwLock};

use thiserror::Error;

use super::catalog::ModuleCatalog;
use super::{
    DaemonHandle, ManagerExport, Module, ModuleSetup, ModuleState, ObjectFactory,
};
use crate::core_interfaces::CORE_INTERFACES;
use crate::interface::InterfaceEntry;

#[derive(Debug, Error)]
pub enum ModuleLoadError {
    #[error("Module '{0}' is not available")]
    Unknown(String),

    #[error("Module '{requested}' identifies itself as '{actual}'")]
    IdMismatch { requested: String, actual: String },

    #[error("Module '{name}' failed to initialize: {reason}")]
    InitFailed { name: String, reason: String },

    #[error("Module '{name}' exports {tag}, which is already taken")]
    DuplicateTypeTag { name: String, tag: String },

    #[error("Module '{0}' is already loaded")]
    AlreadyLoaded(String),
}

/// A loaded module and its entry points
pub struct ModuleDescriptor {
    pub id: String,
    module: Arc<dyn Module>,
    pub state: ModuleState,
    pub block_entries: Vec<Arc<dyn InterfaceEntry>>,
    pub drive_entries: Vec<Arc<dyn InterfaceEntry>>,
    pub factories: Vec<Arc<dyn ObjectFactory>>,
    pub managers: Vec<Arc<dyn ManagerExport>>,
}

impl ModuleDescriptor {
    pub(crate) fn new(id: String, module: Arc<dyn Module>, setup: ModuleSetup) -> Self {
        Self {
            id,
            module,
            state: setup.state,
            block_entries: setup.block_entries,
            drive_entries: setup.drive_entries,
            factories: setup.factories,
            managers: setup.managers,
        }
    }

    fn type_tags(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.block_entries
            .iter()
            .chain(self.drive_entries.iter())
            .map(|entry| entry.type_tag())
    }
}

impl std::fmt::Debug for ModuleDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleDescriptor")
            .field("id", &self.id)
            .field("block_entries", &self.block_entries.len())
            .field("drive_entries", &self.drive_entries.len())
            .field("factories", &self.factories.len())
            .field("managers", &self.managers.len())
            .finish()
    }
}

/// Loaded modules in load order
///
/// Loading is serialized; readers get a snapshot that stays valid while later
/// loads append to the list.
pub struct ModuleRegistry {
    catalog: ModuleCatalog,
    loaded: RwLock<Vec<Arc<ModuleDescriptor>>>,
    load_lock: Mutex<()>,
}

impl ModuleRegistry {
    pub fn new(catalog: ModuleCatalog) -> Self {
        Self {
            catalog,
            loaded: RwLock::new(Vec::new()),
            load_lock: Mutex::new(()),
        }
    }

    pub fn load(
        &self,
        name: &str,
        daemon: &DaemonHandle,
    ) -> Result<Arc<ModuleDescriptor>, ModuleLoadError> {
        let _guard = self.load_lock.lock().unwrap_or_else(|e| e.into_inner());

        if self.get(name).is_some() {
            return Err(ModuleLoadError::AlreadyLoaded(name.to_string()));
        }

        let module = self
            .catalog
            .lookup(name)
            .ok_or_else(|| ModuleLoadError::Unknown(name.to_string()))?;

        let actual = module.id();
        if actual != name {
            return Err(ModuleLoadError::IdMismatch {
                requested: name.to_string(),
                actual: actual.to_string(),
            });
        }

        let setup = module.init(daemon).map_err(|e| ModuleLoadError::InitFailed {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        let descriptor = ModuleDescriptor::new(name.to_string(), module.clone(), setup);

        let mut taken: BTreeSet<&'static str> = CORE_INTERFACES.iter().copied().collect();
        let loaded = self.iter();
        taken.extend(loaded.iter().flat_map(|other| other.type_tags()));
        for tag in descriptor.type_tags() {
            if !taken.insert(tag) {
                module.teardown(&descriptor.state);
                return Err(ModuleLoadError::DuplicateTypeTag {
                    name: name.to_string(),
                    tag: tag.to_string(),
                });
            }
        }

        let descriptor = Arc::new(descriptor);
        self.loaded
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(descriptor.clone());
        tracing::info!("Loaded module {name}");
        Ok(descriptor)
    }

    /// Load several modules; failures are logged and the module is skipped
    pub fn load_all<'a>(
        &self,
        names: impl IntoIterator<Item = &'a str>,
        daemon: &DaemonHandle,
    ) -> Vec<Arc<ModuleDescriptor>> {
        names
            .into_iter()
            .filter_map(|name| match self.load(name, daemon) {
                Ok(descriptor) => Some(descriptor),
                Err(ModuleLoadError::AlreadyLoaded(_)) => None,
                Err(e) => {
                    tracing::warn!("{e}");
                    None
                }
            })
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<Arc<ModuleDescriptor>> {
        self.loaded
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|descriptor| descriptor.id == name)
            .cloned()
    }

    pub fn state_of(&self, name: &str) -> Option<ModuleState> {
        self.get(name).map(|descriptor| descriptor.state.clone())
    }

    /// Snapshot of the loaded modules, in load order
    pub fn iter(&self) -> Vec<Arc<ModuleDescriptor>> {
        self.loaded.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn loaded_names(&self) -> Vec<String> {
        self.iter()
            .iter()
            .map(|descriptor| descriptor.id.clone())
            .collect()
    }

    /// Names of every module that could be loaded
    pub fn supported(&self) -> Vec<String> {
        self.catalog.names()
    }

    /// Run every module's teardown hook, last loaded first
    pub fn teardown_all(&self) {
        for descriptor in self.iter().iter().rev() {
            tracing::debug!("Tearing down module {}", descriptor.id);
            descriptor.module.teardown(&descriptor.state);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use storage_types::UeventAction;

    use super::*;
    use crate::error::{Result, ServiceError};
    use crate::interface::InterfaceInstance;
    use crate::object::TypedObject;
    use crate::test_support::daemon_handle;

    struct TagEntry(&'static str);

    impl InterfaceEntry for TagEntry {
        fn type_tag(&self) -> &'static str {
            self.0
        }

        fn check(&self, _object: &TypedObject) -> bool {
            false
        }

        fn update(
            &self,
            _object: &TypedObject,
            _action: Option<UeventAction>,
            _instance: &mut InterfaceInstance,
        ) -> bool {
            false
        }
    }

    struct TestModule {
        id: &'static str,
        tag: &'static str,
        fail: bool,
        teardowns: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Module for TestModule {
        fn id(&self) -> &'static str {
            self.id
        }

        fn init(&self, _daemon: &DaemonHandle) -> Result<ModuleSetup> {
            if self.fail {
                return Err(ServiceError::Config("no backing tools".to_string()));
            }
            Ok(ModuleSetup::new(Arc::new(AtomicUsize::new(7))).with_block_entry(TagEntry(self.tag)))
        }

        fn teardown(&self, _state: &ModuleState) {
            self.teardowns.lock().unwrap().push(self.id);
        }
    }

    fn catalog(teardowns: &Arc<Mutex<Vec<&'static str>>>) -> ModuleCatalog {
        let module = |id: &'static str, tag: &'static str, fail: bool| {
            let teardowns = teardowns.clone();
            move || -> Arc<dyn Module> {
                Arc::new(TestModule {
                    id,
                    tag,
                    fail,
                    teardowns: teardowns.clone(),
                })
            }
        };
        ModuleCatalog::empty()
            .with("alpha", module("alpha", "org.storaged.Storaged.Alpha", false))
            .with("beta", module("beta", "org.storaged.Storaged.Beta", false))
            .with("broken", module("broken", "org.storaged.Storaged.Broken", true))
            .with("clash", module("clash", "org.storaged.Storaged.Alpha", false))
            .with("liar", module("someone-else", "org.storaged.Storaged.Liar", false))
            .with("core", module("core", "org.storaged.Storaged.Block", false))
    }

    #[tokio::test]
    async fn load_order_is_iteration_order() {
        let teardowns = Arc::new(Mutex::new(Vec::new()));
        let registry = ModuleRegistry::new(catalog(&teardowns));
        let daemon = daemon_handle();

        registry.load("beta", &daemon).expect("beta");
        registry.load("alpha", &daemon).expect("alpha");
        assert_eq!(registry.loaded_names(), vec!["beta", "alpha"]);

        let state = registry.state_of("alpha").expect("state");
        let counter = state.downcast::<AtomicUsize>().expect("module state type");
        assert_eq!(counter.load(Ordering::SeqCst), 7);
        assert!(registry.state_of("missing").is_none());

        registry.teardown_all();
        assert_eq!(*teardowns.lock().unwrap(), vec!["alpha", "beta"]);
    }

    #[tokio::test]
    async fn failed_init_leaves_no_trace() {
        let teardowns = Arc::new(Mutex::new(Vec::new()));
        let registry = ModuleRegistry::new(catalog(&teardowns));
        let daemon = daemon_handle();

        let loaded = registry.load_all(["broken", "alpha", "nonexistent"], &daemon);
        assert_eq!(loaded.len(), 1);
        assert_eq!(registry.loaded_names(), vec!["alpha"]);
    }

    #[tokio::test]
    async fn type_tags_are_exclusive() {
        let teardowns = Arc::new(Mutex::new(Vec::new()));
        let registry = ModuleRegistry::new(catalog(&teardowns));
        let daemon = daemon_handle();

        registry.load("alpha", &daemon).expect("alpha");
        assert!(matches!(
            registry.load("clash", &daemon),
            Err(ModuleLoadError::DuplicateTypeTag { .. })
        ));
        assert!(matches!(
            registry.load("core", &daemon),
            Err(ModuleLoadError::DuplicateTypeTag { .. })
        ));
        assert_eq!(registry.loaded_names(), vec!["alpha"]);
        // a rejected module is torn down right away
        assert_eq!(*teardowns.lock().unwrap(), vec!["clash", "core"]);
    }

    #[tokio::test]
    async fn id_must_match_requested_name() {
        let teardowns = Arc::new(Mutex::new(Vec::new()));
        let registry = ModuleRegistry::new(catalog(&teardowns));
        let daemon = daemon_handle();

        assert!(matches!(
            registry.load("liar", &daemon),
            Err(ModuleLoadError::IdMismatch { .. })
        ));
        assert!(matches!(
            registry.load("alpha", &daemon).and_then(|_| registry.load("alpha", &daemon)),
            Err(ModuleLoadError::AlreadyLoaded(_))
        ));
    }
}
