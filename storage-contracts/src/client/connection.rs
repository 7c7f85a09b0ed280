// SPDX-License-Identifier: GPL-3.0-only

//! Shared D-Bus connection management
//!
//! One connection per bus is established lazily and reused by every client
//! built on top of it.

use std::sync::OnceLock;

use zbus::Connection;

use super::error::ClientError;

static SYSTEM_CONNECTION: OnceLock<Connection> = OnceLock::new();
static SESSION_CONNECTION: OnceLock<Connection> = OnceLock::new();

/// Which message bus the daemon is reachable on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BusKind {
    #[default]
    System,
    /// Used when the daemon runs unprivileged for testing
    Session,
}

/// Get or create the shared connection to `bus`
pub async fn shared_connection(bus: BusKind) -> Result<&'static Connection, ClientError> {
    let cell = match bus {
        BusKind::System => &SYSTEM_CONNECTION,
        BusKind::Session => &SESSION_CONNECTION,
    };
    if let Some(conn) = cell.get() {
        return Ok(conn);
    }

    let conn = match bus {
        BusKind::System => Connection::system().await,
        BusKind::Session => Connection::session().await,
    }
    .map_err(|e| ClientError::Connection(format!("Failed to connect to {bus:?} bus: {e}")))?;

    // Another task may have won the race; keep whichever landed first
    let _ = cell.set(conn);

    cell.get().ok_or_else(|| {
        ClientError::Connection("Failed to initialize shared bus connection".to_string())
    })
}
