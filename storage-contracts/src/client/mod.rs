// SPDX-License-Identifier: GPL-3.0-only

//! D-Bus client wrappers for the storaged daemon

pub mod connection;
pub mod error;
pub mod manager;
pub mod objects;

pub use connection::{BusKind, shared_connection};
pub use error::ClientError;
pub use manager::ManagerClient;
pub use objects::{BusSignal, ManagedObject, ObjectsClient};
