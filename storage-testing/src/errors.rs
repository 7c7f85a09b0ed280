// SPDX-License-Identifier: GPL-3.0-only

use std::time::Duration;

use storage_service::ServiceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TestingError {
    #[error("timed out after {timeout:?} waiting for {what}")]
    Timeout { what: String, timeout: Duration },
    #[error("state directory: {0}")]
    StateDir(#[from] std::io::Error),
    #[error(transparent)]
    Daemon(#[from] ServiceError),
}

pub type Result<T> = std::result::Result<T, TestingError>;
