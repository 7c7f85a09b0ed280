// SPDX-License-Identifier: GPL-3.0-only

use std::sync::Mutex;

use async_trait::async_trait;
use storage_contracts::{Authority, AuthorizationResult, StorageError};
use storage_types::CallerInfo;

/// One authorization request seen by [`FakeAuthority`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorityCheck {
    pub uid: u32,
    pub action_id: String,
    pub allow_user_interaction: bool,
}

/// Answers every check with a fixed verdict and records what was asked
pub struct FakeAuthority {
    verdict: Mutex<AuthorizationResult>,
    checks: Mutex<Vec<AuthorityCheck>>,
}

impl Default for FakeAuthority {
    fn default() -> Self {
        Self::new(AuthorizationResult::Authorized)
    }
}

impl FakeAuthority {
    pub fn new(verdict: AuthorizationResult) -> Self {
        Self {
            verdict: Mutex::new(verdict),
            checks: Mutex::new(Vec::new()),
        }
    }

    pub fn set_verdict(&self, verdict: AuthorizationResult) {
        *self.verdict.lock().unwrap_or_else(|e| e.into_inner()) = verdict;
    }

    pub fn checks(&self) -> Vec<AuthorityCheck> {
        self.checks.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl Authority for FakeAuthority {
    async fn check(
        &self,
        caller: &CallerInfo,
        action_id: &str,
        allow_user_interaction: bool,
    ) -> Result<AuthorizationResult, StorageError> {
        self.checks.lock().unwrap_or_else(|e| e.into_inner()).push(AuthorityCheck {
            uid: caller.uid,
            action_id: action_id.to_string(),
            allow_user_interaction,
        });
        Ok(*self.verdict.lock().unwrap_or_else(|e| e.into_inner()))
    }
}
