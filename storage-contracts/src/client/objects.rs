// SPDX-License-Identifier: GPL-3.0-only

//! Object tree access and signal monitoring

use std::collections::BTreeMap;

use futures_util::{Stream, StreamExt};
use storage_types::PropertyBag;
use zbus::fdo::ObjectManagerProxy;
use zbus::zvariant::OwnedValue;
use zbus::{MatchRule, Message, MessageStream};

use crate::client::connection::{BusKind, shared_connection};
use crate::client::error::ClientError;
use crate::protocol::wire::{WireProperties, from_wire_properties};
use crate::{BUS_NAME, INTERFACE_PREFIX};

/// Object-tree root where the daemon serves `org.freedesktop.DBus.ObjectManager`
pub const OBJECT_MANAGER_PATH: &str = "/org/storaged/Storaged";

/// One exported object with the daemon's own interfaces decoded
#[derive(Debug, Clone, PartialEq)]
pub struct ManagedObject {
    pub path: String,
    pub interfaces: BTreeMap<String, PropertyBag>,
}

/// Decoded signal emitted by the daemon
#[derive(Debug, Clone, PartialEq)]
pub enum BusSignal {
    InterfacesAdded {
        path: String,
        interfaces: BTreeMap<String, PropertyBag>,
    },
    InterfacesRemoved {
        path: String,
        interfaces: Vec<String>,
    },
    PropertiesChanged {
        path: String,
        interface: String,
        changed: PropertyBag,
    },
}

impl BusSignal {
    pub fn path(&self) -> &str {
        match self {
            Self::InterfacesAdded { path, .. }
            | Self::InterfacesRemoved { path, .. }
            | Self::PropertiesChanged { path, .. } => path,
        }
    }
}

pub struct ObjectsClient {
    bus: BusKind,
    proxy: ObjectManagerProxy<'static>,
}

impl ObjectsClient {
    pub async fn new(bus: BusKind) -> Result<Self, ClientError> {
        let conn = shared_connection(bus).await?;
        let proxy = ObjectManagerProxy::builder(conn)
            .destination(BUS_NAME)?
            .path(OBJECT_MANAGER_PATH)?
            .build()
            .await
            .map_err(|e| {
                ClientError::Connection(format!("Failed to create object manager proxy: {e}"))
            })?;
        Ok(Self { bus, proxy })
    }

    /// Every exported object, sorted by path
    pub async fn managed_objects(&self) -> Result<Vec<ManagedObject>, ClientError> {
        let objects = self.proxy.get_managed_objects().await?;
        let mut objects: Vec<ManagedObject> = objects
            .into_iter()
            .map(|(path, interfaces)| ManagedObject {
                path: path.to_string(),
                interfaces: interfaces
                    .into_iter()
                    .filter(|(name, _)| name.as_str().starts_with(INTERFACE_PREFIX))
                    .map(|(name, props)| (name.to_string(), from_wire_properties(&props)))
                    .collect(),
            })
            .collect();
        objects.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(objects)
    }

    /// Stream of the daemon's object and property signals, in emission order
    pub async fn signals(
        &self,
    ) -> Result<impl Stream<Item = BusSignal> + Send + 'static, ClientError> {
        let conn = shared_connection(self.bus).await?;
        let rule = MatchRule::builder()
            .msg_type(zbus::message::Type::Signal)
            .sender(BUS_NAME)?
            .build();
        let stream = MessageStream::for_match_rule(rule, conn, None).await?;
        Ok(stream.filter_map(|message| async move {
            match message {
                Ok(message) => decode_signal(&message),
                Err(e) => {
                    tracing::warn!("Dropping unreadable message: {e}");
                    None
                }
            }
        }))
    }
}

fn decode_signal(message: &Message) -> Option<BusSignal> {
    let header = message.header();
    let member = header.member()?.to_string();
    let interface = header.interface()?.to_string();
    let body = message.body();
    match (interface.as_str(), member.as_str()) {
        ("org.freedesktop.DBus.ObjectManager", "InterfacesAdded") => {
            let (path, interfaces): (
                zbus::zvariant::OwnedObjectPath,
                std::collections::HashMap<String, WireProperties>,
            ) = body.deserialize().ok()?;
            Some(BusSignal::InterfacesAdded {
                path: path.to_string(),
                interfaces: interfaces
                    .iter()
                    .map(|(name, props)| (name.clone(), from_wire_properties(props)))
                    .collect(),
            })
        }
        ("org.freedesktop.DBus.ObjectManager", "InterfacesRemoved") => {
            let (path, interfaces): (zbus::zvariant::OwnedObjectPath, Vec<String>) =
                body.deserialize().ok()?;
            Some(BusSignal::InterfacesRemoved {
                path: path.to_string(),
                interfaces,
            })
        }
        ("org.freedesktop.DBus.Properties", "PropertiesChanged") => {
            let (changed_interface, changed, _invalidated): (
                String,
                std::collections::HashMap<String, OwnedValue>,
                Vec<String>,
            ) = body.deserialize().ok()?;
            Some(BusSignal::PropertiesChanged {
                path: header.path()?.to_string(),
                interface: changed_interface,
                changed: from_wire_properties(&changed),
            })
        }
        _ => None,
    }
}
