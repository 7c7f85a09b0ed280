// SPDX-License-Identifier: GPL-3.0-only

//! storaged service core
//!
//! The daemon tracks block devices, hands them to pluggable modules and
//! exports the result as bus objects. The core in here does not depend on a
//! live bus: everything talks through the collaborator traits of
//! `storage-contracts`, so the whole pipeline runs in tests against fakes.

pub mod adapters;
pub mod attacher;
pub mod auth;
pub mod bus;
pub mod claims;
pub mod config;
pub mod core_interfaces;
pub mod daemon;
pub mod dispatcher;
pub mod error;
pub mod housekeeping;
pub mod interface;
pub mod module;
pub mod modules;
pub mod object;
pub mod object_manager;

#[cfg(test)]
mod test_support;

pub use config::DaemonConfig;
pub use daemon::{Daemon, RunningDaemon};
pub use dispatcher::DispatchItem;
pub use error::{Result, ServiceError, WireError};
pub use module::{ClaimDecision, DaemonHandle, Module, ModuleCatalog, ModuleRegistry};
pub use object_manager::{BusEvent, ExportedObject, ObjectManager};
