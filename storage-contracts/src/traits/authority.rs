// SPDX-License-Identifier: GPL-3.0-only

use async_trait::async_trait;
use storage_types::CallerInfo;

use crate::StorageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationResult {
    Authorized,
    /// Not authorized, but the caller could obtain it by authenticating
    Challenge,
    NotAuthorized,
}

/// System policy service deciding whether a caller may perform an action
#[async_trait]
pub trait Authority: Send + Sync {
    async fn check(
        &self,
        caller: &CallerInfo,
        action_id: &str,
        allow_user_interaction: bool,
    ) -> Result<AuthorizationResult, StorageError>;
}
