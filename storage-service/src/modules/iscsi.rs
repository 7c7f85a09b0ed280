// SPDX-License-Identifier: GPL-3.0-only

//! iSCSI initiator module
//!
//! Serves `Manager.ISCSI.Initiator` for discovery and session management,
//! and groups the block devices of each session under `/iscsi/session<N>`.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use storage_contracts::IscsiOps;
use storage_contracts::wire::options_from_wire;
use storage_macros::with_caller;
use storage_types::{
    CallerInfo, Device, IscsiNode, IscsiSessionInfo, ObjectPath, OptionBag, PropertyBag,
    UeventAction, session_id_from_syspath,
};
use zbus::message::Header as MessageHeader;
use zbus::zvariant::OwnedValue;
use zbus::{Connection, interface};

use super::blocking;
use crate::auth::{actions, authorize};
use crate::error::{Result, ServiceError, WireError};
use crate::module::{ClaimDecision, DaemonHandle, Module, ModuleObject, ModuleSetup, ObjectFactory};

pub const SESSION_INTERFACE: &str = "org.storaged.Storaged.ISCSI.Session";

/// Discovered node as it travels on the bus: name, tpgt, address, port, iface
pub type WireNode = (String, i32, String, i32, String);

pub fn session_path(session_id: &str) -> ObjectPath {
    ObjectPath::root().child("iscsi").child(session_id)
}

pub struct IscsiModule;

impl Module for IscsiModule {
    fn id(&self) -> &'static str {
        "iscsi"
    }

    fn init(&self, daemon: &DaemonHandle) -> Result<ModuleSetup> {
        let manager = Arc::new(IscsiManager::new(daemon.clone()));
        Ok(ModuleSetup::new(manager.clone())
            .with_factory(SessionFactory {
                iscsi: daemon.blocklib.iscsi.clone(),
            })
            .with_manager(IscsiInitiatorIface { manager }))
    }
}

pub struct SessionFactory {
    iscsi: Arc<dyn IscsiOps>,
}

impl ObjectFactory for SessionFactory {
    fn name(&self) -> &'static str {
        "session"
    }

    fn create(&self, device: &Device) -> Result<Option<Box<dyn ModuleObject>>> {
        let Some(session_id) = session_id_from_syspath(device.syspath()) else {
            return Ok(None);
        };
        let info = self.iscsi.session_info(&session_id)?;
        Ok(Some(Box::new(SessionObject {
            path: session_path(&session_id),
            session_id,
            info,
            devices: BTreeSet::from([device.syspath().to_string()]),
        })))
    }
}

pub struct SessionObject {
    path: ObjectPath,
    session_id: String,
    info: IscsiSessionInfo,
    devices: BTreeSet<String>,
}

impl ModuleObject for SessionObject {
    fn path(&self) -> &ObjectPath {
        &self.path
    }

    fn process_uevent(&mut self, action: UeventAction, device: &Device) -> Result<ClaimDecision> {
        let syspath = device.syspath();
        let ours = session_id_from_syspath(syspath).as_deref() == Some(self.session_id.as_str());
        if action == UeventAction::Remove || !ours {
            self.devices.remove(syspath);
            return Ok(ClaimDecision::Release);
        }
        self.devices.insert(syspath.to_string());
        Ok(ClaimDecision::Keep)
    }

    fn interfaces(&self) -> Vec<(&'static str, PropertyBag)> {
        let info = &self.info;
        let mut bag = PropertyBag::new();
        bag.insert("target_name".into(), info.target_name.clone().into());
        bag.insert("tpgt".into(), i64::from(info.tpgt).into());
        bag.insert("address".into(), info.address.clone().into());
        bag.insert("port".into(), i64::from(info.port).into());
        bag.insert(
            "persistent_address".into(),
            info.persistent_address.clone().into(),
        );
        bag.insert("persistent_port".into(), i64::from(info.persistent_port).into());
        bag.insert("num_devices".into(), (self.devices.len() as u64).into());
        vec![(SESSION_INTERFACE, bag)]
    }
}

fn node_from_wire(name: String, tpgt: i32, address: String, port: i32, iface: String) -> Result<IscsiNode> {
    if name.is_empty() {
        return Err(ServiceError::InvalidArgument(
            "Target name must not be empty".to_string(),
        ));
    }
    if address.is_empty() {
        return Err(ServiceError::InvalidArgument(
            "Portal address must not be empty".to_string(),
        ));
    }
    if !(1..=i32::from(u16::MAX)).contains(&port) {
        return Err(ServiceError::InvalidArgument(format!("Invalid port {port}")));
    }
    Ok(IscsiNode {
        name,
        tpgt,
        address,
        port,
        iface: if iface.is_empty() { "default".to_string() } else { iface },
    })
}

pub struct IscsiManager {
    daemon: DaemonHandle,
}

impl IscsiManager {
    pub fn new(daemon: DaemonHandle) -> Self {
        Self { daemon }
    }

    pub async fn initiator_name(&self) -> Result<String> {
        let iscsi = self.daemon.blocklib.iscsi.clone();
        blocking(move || iscsi.initiator_name()).await
    }

    pub async fn discover_send_targets(
        &self,
        caller: &CallerInfo,
        address: &str,
        port: u16,
        options: &OptionBag,
    ) -> Result<Vec<IscsiNode>> {
        authorize(
            self.daemon.authority.as_ref(),
            caller,
            actions::MANAGE_ISCSI,
            options,
        )
        .await?;
        if address.is_empty() {
            return Err(ServiceError::InvalidArgument(
                "Portal address must not be empty".to_string(),
            ));
        }

        tracing::info!("Discovering iSCSI targets at {address}:{port} for UID {}", caller.uid);
        let iscsi = self.daemon.blocklib.iscsi.clone();
        let address = address.to_string();
        blocking(move || iscsi.discover_send_targets(&address, port)).await
    }

    pub async fn login(&self, caller: &CallerInfo, node: IscsiNode, options: &OptionBag) -> Result<()> {
        authorize(
            self.daemon.authority.as_ref(),
            caller,
            actions::MANAGE_ISCSI,
            options,
        )
        .await?;

        tracing::info!("Logging in to {} for UID {}", node.name, caller.uid);
        let iscsi = self.daemon.blocklib.iscsi.clone();
        blocking(move || iscsi.login(&node)).await
    }

    pub async fn logout(&self, caller: &CallerInfo, node: IscsiNode, options: &OptionBag) -> Result<()> {
        authorize(
            self.daemon.authority.as_ref(),
            caller,
            actions::MANAGE_ISCSI,
            options,
        )
        .await?;

        tracing::info!("Logging out of {} for UID {}", node.name, caller.uid);
        let iscsi = self.daemon.blocklib.iscsi.clone();
        blocking(move || iscsi.logout(&node)).await
    }
}

#[derive(Clone)]
pub struct IscsiInitiatorIface {
    manager: Arc<IscsiManager>,
}

#[interface(name = "org.storaged.Storaged.Manager.ISCSI.Initiator")]
impl IscsiInitiatorIface {
    /// Name of this host's iSCSI initiator
    #[zbus(property)]
    async fn initiator_name(&self) -> zbus::fdo::Result<String> {
        self.manager
            .initiator_name()
            .await
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    /// Discover targets through a SendTargets portal
    ///
    /// Example:
    /// ```bash
    /// busctl call org.storaged.Storaged /org/storaged/Storaged/Manager \
    ///   org.storaged.Storaged.Manager.ISCSI.Initiator \
    ///   DiscoverSendTargets sqa{sv} 192.168.1.20 3260 0
    /// ```
    #[with_caller]
    async fn discover_send_targets(
        &self,
        #[zbus(connection)] _connection: &Connection,
        #[zbus(header)] _header: MessageHeader<'_>,
        address: String,
        port: u16,
        options: HashMap<String, OwnedValue>,
    ) -> std::result::Result<Vec<WireNode>, WireError> {
        let nodes = self
            .manager
            .discover_send_targets(&caller, &address, port, &options_from_wire(&options))
            .await?;
        Ok(nodes
            .into_iter()
            .map(|node| (node.name, node.tpgt, node.address, node.port, node.iface))
            .collect())
    }

    /// Log in to a discovered node
    #[with_caller]
    async fn login(
        &self,
        #[zbus(connection)] _connection: &Connection,
        #[zbus(header)] _header: MessageHeader<'_>,
        name: String,
        tpgt: i32,
        address: String,
        port: i32,
        iface: String,
        options: HashMap<String, OwnedValue>,
    ) -> std::result::Result<(), WireError> {
        let node = node_from_wire(name, tpgt, address, port, iface)?;
        self.manager
            .login(&caller, node, &options_from_wire(&options))
            .await?;
        Ok(())
    }

    /// Log out of a node
    #[with_caller]
    async fn logout(
        &self,
        #[zbus(connection)] _connection: &Connection,
        #[zbus(header)] _header: MessageHeader<'_>,
        name: String,
        tpgt: i32,
        address: String,
        port: i32,
        iface: String,
        options: HashMap<String, OwnedValue>,
    ) -> std::result::Result<(), WireError> {
        let node = node_from_wire(name, tpgt, address, port, iface)?;
        self.manager
            .logout(&caller, node, &options_from_wire(&options))
            .await?;
        Ok(())
    }
}
