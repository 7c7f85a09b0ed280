// SPDX-License-Identifier: GPL-3.0-only

use storage_types::{IscsiNode, IscsiSessionInfo};

use crate::StorageError;

pub trait IscsiOps: Send + Sync {
    fn initiator_name(&self) -> Result<String, StorageError>;

    fn discover_send_targets(&self, address: &str, port: u16)
    -> Result<Vec<IscsiNode>, StorageError>;

    fn login(&self, node: &IscsiNode) -> Result<(), StorageError>;

    fn logout(&self, node: &IscsiNode) -> Result<(), StorageError>;

    fn session_info(&self, session_id: &str) -> Result<IscsiSessionInfo, StorageError>;
}
