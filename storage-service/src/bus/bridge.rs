// SPDX-License-Identifier: GPL-3.0-only

//! Relays flushed object-manager notifications as bus signals

use std::collections::HashMap;

use storage_contracts::wire::to_wire_properties;
use storage_types::ObjectPath;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use zbus::Connection;
use zbus::names::BusName;
use zbus::object_server::SignalEmitter;
use zbus::zvariant;

use super::object_manager::ObjectManagerIface;
use crate::object_manager::BusEvent;

const PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";

pub struct SignalBridge {
    connection: Connection,
    events: broadcast::Receiver<BusEvent>,
}

impl SignalBridge {
    pub fn new(connection: Connection, events: broadcast::Receiver<BusEvent>) -> Self {
        Self { connection, events }
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                event = self.events.recv() => event,
            };
            match event {
                Ok(event) => {
                    if let Err(e) = self.emit(&event).await {
                        tracing::warn!("Failed to signal change of {}: {e}", event.path());
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!("Signal bridge fell behind, {missed} notifications lost");
                }
                Err(RecvError::Closed) => break,
            }
        }
        tracing::debug!("Signal bridge stopped");
    }

    async fn emit(&self, event: &BusEvent) -> zbus::Result<()> {
        let root = ObjectPath::root();
        match event {
            BusEvent::InterfacesAdded { path, interfaces } => {
                let emitter = SignalEmitter::new(&self.connection, root.as_str())?;
                let interfaces = interfaces
                    .iter()
                    .map(|(name, properties)| Ok((name.clone(), to_wire_properties(properties)?)))
                    .collect::<zvariant::Result<HashMap<_, _>>>()?;
                ObjectManagerIface::interfaces_added(&emitter, wire_path(path)?, interfaces).await
            }
            BusEvent::InterfacesRemoved { path, interfaces } => {
                let emitter = SignalEmitter::new(&self.connection, root.as_str())?;
                ObjectManagerIface::interfaces_removed(&emitter, wire_path(path)?, interfaces.clone())
                    .await
            }
            BusEvent::PropertiesChanged {
                path,
                interface,
                changed,
            } => {
                let changed = to_wire_properties(changed)?;
                self.connection
                    .emit_signal(
                        None::<BusName<'_>>,
                        path.as_str(),
                        PROPERTIES_INTERFACE,
                        "PropertiesChanged",
                        &(interface.as_str(), changed, Vec::<String>::new()),
                    )
                    .await
            }
        }
    }
}

fn wire_path(path: &ObjectPath) -> zvariant::Result<zvariant::ObjectPath<'_>> {
    zvariant::ObjectPath::try_from(path.as_str())
}
