// SPDX-License-Identifier: GPL-3.0-only

//! Captures the bus notifications the daemon publishes

use std::time::Duration;

use storage_service::{BusEvent, ObjectManager};
use storage_types::{ObjectPath, PropertyBag};
use tokio::sync::broadcast::{self, error::TryRecvError};

pub struct Recorder {
    receiver: broadcast::Receiver<BusEvent>,
}

impl Recorder {
    pub fn new(objects: &ObjectManager) -> Self {
        Self {
            receiver: objects.subscribe(),
        }
    }

    /// Everything published since the last call
    pub fn drain(&mut self) -> Vec<BusEvent> {
        let mut events = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Lagged(missed)) => {
                    tracing::warn!("Recorder missed {missed} notifications");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
        events
    }

    /// Next notification, or `None` when nothing arrives within `timeout`
    pub async fn next(&mut self, timeout: Duration) -> Option<BusEvent> {
        loop {
            match tokio::time::timeout(timeout, self.receiver.recv()).await {
                Ok(Ok(event)) => return Some(event),
                Ok(Err(broadcast::error::RecvError::Lagged(missed))) => {
                    tracing::warn!("Recorder missed {missed} notifications");
                }
                Ok(Err(broadcast::error::RecvError::Closed)) | Err(_) => return None,
            }
        }
    }
}

/// One-line rendering of a notification, for compact assertions
pub fn describe(event: &BusEvent) -> String {
    match event {
        BusEvent::InterfacesAdded { path, interfaces } => format!(
            "added {} [{}]",
            short(path),
            interfaces.keys().map(|name| short_interface(name)).collect::<Vec<_>>().join(", ")
        ),
        BusEvent::InterfacesRemoved { path, interfaces } => format!(
            "removed {} [{}]",
            short(path),
            interfaces.iter().map(|name| short_interface(name)).collect::<Vec<_>>().join(", ")
        ),
        BusEvent::PropertiesChanged {
            path,
            interface,
            changed,
        } => format!(
            "changed {} {} {{{}}}",
            short(path),
            short_interface(interface),
            render(changed)
        ),
    }
}

pub fn describe_all(events: &[BusEvent]) -> Vec<String> {
    events.iter().map(describe).collect()
}

fn short(path: &ObjectPath) -> &str {
    path.as_str()
        .strip_prefix(storage_types::OBJECT_ROOT)
        .unwrap_or(path.as_str())
}

fn short_interface(name: &str) -> &str {
    name.strip_prefix("org.storaged.Storaged.").unwrap_or(name)
}

fn render(properties: &PropertyBag) -> String {
    properties
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join(", ")
}
