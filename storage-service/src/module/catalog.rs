// SPDX-License-Identifier: GPL-3.0-only

//! Modules the daemon knows how to load
//!
//! Built-in modules are listed by name; which ones exist depends on the
//! `mod-*` cargo features.

use std::sync::Arc;

use super::Module;

type Constructor = Arc<dyn Fn() -> Arc<dyn Module> + Send + Sync>;

#[derive(Clone)]
pub struct ModuleCatalog {
    entries: Vec<(String, Constructor)>,
}

impl Default for ModuleCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ModuleCatalog {
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Every compiled-in module
    pub fn builtin() -> Self {
        #[allow(unused_mut)]
        let mut catalog = Self::empty();
        #[cfg(feature = "mod-btrfs")]
        {
            catalog = catalog.with("btrfs", || Arc::new(crate::modules::btrfs::BtrfsModule));
        }
        #[cfg(feature = "mod-zram")]
        {
            catalog = catalog.with("zram", || Arc::new(crate::modules::zram::ZramModule));
        }
        #[cfg(feature = "mod-lvm2")]
        {
            catalog = catalog.with("lvm2", || Arc::new(crate::modules::lvm2::Lvm2Module));
        }
        #[cfg(feature = "mod-bcache")]
        {
            catalog = catalog.with("bcache", || Arc::new(crate::modules::bcache::BcacheModule));
        }
        #[cfg(feature = "mod-vdo")]
        {
            catalog = catalog.with("vdo", || Arc::new(crate::modules::vdo::VdoModule));
        }
        #[cfg(feature = "mod-iscsi")]
        {
            catalog = catalog.with("iscsi", || Arc::new(crate::modules::iscsi::IscsiModule));
        }
        #[cfg(feature = "mod-dummy")]
        {
            catalog = catalog.with("dummy", || Arc::new(crate::modules::dummy::DummyModule));
        }
        catalog
    }

    /// Register a module under `name`, replacing an earlier one of the same name
    pub fn with<F>(mut self, name: &str, constructor: F) -> Self
    where
        F: Fn() -> Arc<dyn Module> + Send + Sync + 'static,
    {
        self.entries.retain(|(existing, _)| existing != name);
        self.entries.push((name.to_string(), Arc::new(constructor)));
        self
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Module>> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, constructor)| constructor())
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|(name, _)| name.clone()).collect()
    }
}

/// Names of the compiled-in modules
pub fn builtin_names() -> Vec<String> {
    ModuleCatalog::builtin().names()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_lists_enabled_modules() {
        let names = builtin_names();
        #[cfg(feature = "mod-zram")]
        assert!(names.contains(&"zram".to_string()));
        #[cfg(feature = "mod-dummy")]
        assert!(names.contains(&"dummy".to_string()));
        assert!(ModuleCatalog::builtin().lookup("glusterfs").is_none());
    }
}
