// SPDX-License-Identifier: GPL-3.0-only

//! The daemon on the bus
//!
//! Everything in here is a thin layer over the core: the object-manager view
//! of exported objects, the root manager interface, the module manager
//! interfaces, and the bridge that turns flushed notifications into signals.

pub mod bridge;
pub mod manager;
pub mod object_manager;

use std::sync::Arc;

use storage_types::ObjectPath;
use zbus::object_server::ObjectServer;

use crate::module::ModuleDescriptor;

pub use bridge::SignalBridge;
pub use manager::ManagerIface;
pub use object_manager::ObjectManagerIface;

/// Serve the manager interfaces of `modules` at the manager path; returns how many were added
pub async fn serve_managers(server: &ObjectServer, modules: &[Arc<ModuleDescriptor>]) -> usize {
    let path = ObjectPath::manager();
    let mut served = 0;
    for module in modules {
        for manager in &module.managers {
            match manager.serve(server, &path).await {
                Ok(true) => {
                    tracing::info!("  - {} at {path}", manager.interface_name());
                    served += 1;
                }
                Ok(false) => {
                    tracing::debug!("{} is already served", manager.interface_name());
                }
                Err(e) => tracing::warn!(
                    "Failed to serve {} of module {}: {e}",
                    manager.interface_name(),
                    module.id
                ),
            }
        }
    }
    served
}
