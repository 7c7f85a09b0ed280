// SPDX-License-Identifier: GPL-3.0-only

use std::collections::HashMap;

use zbus::proxy;
use zbus::zvariant::{OwnedObjectPath, OwnedValue};

use crate::client::connection::{BusKind, shared_connection};
use crate::client::error::ClientError;

/// D-Bus proxy for the daemon's root manager object
#[proxy(
    interface = "org.storaged.Storaged.Manager",
    default_service = "org.storaged.Storaged",
    default_path = "/org/storaged/Storaged/Manager"
)]
pub trait ManagerInterface {
    /// Load every module the daemon was built with
    async fn enable_modules(&self, enable: bool) -> zbus::Result<()>;

    async fn get_block_devices(
        &self,
        options: HashMap<String, OwnedValue>,
    ) -> zbus::Result<Vec<OwnedObjectPath>>;

    /// Block objects matching a `path`, `label` or `uuid` device spec
    async fn resolve_device(
        &self,
        devspec: HashMap<String, OwnedValue>,
        options: HashMap<String, OwnedValue>,
    ) -> zbus::Result<Vec<OwnedObjectPath>>;

    #[zbus(property)]
    fn version(&self) -> zbus::Result<String>;

    #[zbus(property)]
    fn supported_modules(&self) -> zbus::Result<Vec<String>>;

    #[zbus(property)]
    fn loaded_modules(&self) -> zbus::Result<Vec<String>>;
}

/// Client for the root manager object
pub struct ManagerClient {
    proxy: ManagerInterfaceProxy<'static>,
}

impl ManagerClient {
    pub async fn new(bus: BusKind) -> Result<Self, ClientError> {
        let conn = shared_connection(bus).await?;
        let proxy = ManagerInterfaceProxy::new(conn).await.map_err(|e| {
            ClientError::Connection(format!("Failed to create manager proxy: {e}"))
        })?;
        Ok(Self { proxy })
    }

    pub async fn version(&self) -> Result<String, ClientError> {
        Ok(self.proxy.version().await?)
    }

    pub async fn supported_modules(&self) -> Result<Vec<String>, ClientError> {
        Ok(self.proxy.supported_modules().await?)
    }

    pub async fn loaded_modules(&self) -> Result<Vec<String>, ClientError> {
        Ok(self.proxy.loaded_modules().await?)
    }

    pub async fn enable_modules(&self) -> Result<(), ClientError> {
        Ok(self.proxy.enable_modules(true).await?)
    }

    pub async fn block_devices(&self) -> Result<Vec<String>, ClientError> {
        let paths = self.proxy.get_block_devices(HashMap::new()).await?;
        Ok(paths.into_iter().map(|path| path.to_string()).collect())
    }
}
