// SPDX-License-Identifier: GPL-3.0-only

use std::collections::HashMap;

use async_trait::async_trait;
use storage_contracts::{Authority, AuthorizationResult, StorageError};
use storage_types::{CallerInfo, OptionBag};
use zbus::Connection;
use zbus_polkit::policykit1::{AuthorityProxy, CheckAuthorizationFlags, Subject};

use crate::error::{Result, ServiceError};

/// Polkit action identifiers checked by the manager interfaces
pub mod actions {
    pub const MANAGE_MODULES: &str = "org.storaged.storaged.manage-modules";
    pub const MANAGE_BTRFS: &str = "org.storaged.storaged.btrfs.manage-btrfs";
    pub const MANAGE_ZRAM: &str = "org.storaged.storaged.zram.manage-zram";
    pub const MANAGE_LVM: &str = "org.storaged.storaged.lvm2.manage-lvm";
    pub const MANAGE_BCACHE: &str = "org.storaged.storaged.bcache.manage-bcache";
    pub const MANAGE_ISCSI: &str = "org.storaged.storaged.iscsi.manage-iscsi";
}

/// Authority backed by the system Polkit daemon
pub struct PolkitAuthority {
    connection: Connection,
}

impl PolkitAuthority {
    pub fn new(connection: Connection) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl Authority for PolkitAuthority {
    async fn check(
        &self,
        caller: &CallerInfo,
        action_id: &str,
        allow_user_interaction: bool,
    ) -> std::result::Result<AuthorizationResult, StorageError> {
        if caller.is_root() {
            tracing::debug!("Caller {} is root, {action_id} granted", caller.sender);
            return Ok(AuthorizationResult::Authorized);
        }

        let authority = AuthorityProxy::new(&self.connection)
            .await
            .map_err(|e| StorageError::failed(format!("Polkit connection error: {e}")))?;

        let subject = Subject::new_for_owner(caller.pid, None, None)
            .map_err(|e| StorageError::failed(format!("Failed to create Polkit subject: {e}")))?;

        let flags = if allow_user_interaction {
            CheckAuthorizationFlags::AllowUserInteraction.into()
        } else {
            Default::default()
        };

        let result = authority
            .check_authorization(&subject, action_id, &HashMap::new(), flags, "")
            .await
            .map_err(|e| StorageError::failed(format!("Authorization check failed: {e}")))?;

        tracing::debug!(
            "Authorization result for {}: is_authorized={}, is_challenge={}",
            action_id,
            result.is_authorized,
            result.is_challenge
        );

        Ok(if result.is_authorized {
            AuthorizationResult::Authorized
        } else if result.is_challenge {
            AuthorizationResult::Challenge
        } else {
            AuthorizationResult::NotAuthorized
        })
    }
}

/// Check `caller` against `action_id`, honouring `auth-no-user-interaction`
pub async fn authorize(
    authority: &dyn Authority,
    caller: &CallerInfo,
    action_id: &str,
    options: &OptionBag,
) -> Result<()> {
    let allow_user_interaction = !options.no_user_interaction();
    match authority
        .check(caller, action_id, allow_user_interaction)
        .await?
    {
        AuthorizationResult::Authorized => {
            tracing::info!("Authorization granted for action: {action_id}");
            Ok(())
        }
        result => {
            tracing::warn!(
                "Authorization denied for action {action_id} (uid {})",
                caller.uid
            );
            Err(ServiceError::NotAuthorized {
                action: action_id.to_string(),
                could_obtain: result == AuthorizationResult::Challenge,
            })
        }
    }
}
