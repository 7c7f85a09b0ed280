// SPDX-License-Identifier: GPL-3.0-only

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};
use storage_contracts::{DeviceSource, StorageError};
use storage_types::{Device, Uevent, UeventAction};
use tokio::sync::mpsc;

/// Device source whose live events are pushed by the test
///
/// The device table follows every emitted event, so `enumerate` and
/// `lookup` agree with what the daemon has been told.
pub struct ChannelDeviceSource {
    devices: Mutex<BTreeMap<String, Device>>,
    sender: mpsc::UnboundedSender<Uevent>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Uevent>>>,
    triggered: Mutex<Vec<String>>,
}

impl ChannelDeviceSource {
    pub fn new(present: Vec<Device>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            devices: Mutex::new(
                present
                    .into_iter()
                    .map(|device| (device.syspath().to_string(), device))
                    .collect(),
            ),
            sender,
            receiver: Mutex::new(Some(receiver)),
            triggered: Mutex::new(Vec::new()),
        }
    }

    /// Update the device table without delivering anything
    pub fn remember(&self, event: &Uevent) {
        let mut devices = lock(&self.devices);
        match event.action {
            UeventAction::Remove => {
                devices.remove(event.syspath());
            }
            UeventAction::Add | UeventAction::Change => {
                devices.insert(event.syspath().to_string(), event.device.as_ref().clone());
            }
        }
    }

    /// Update the device table and deliver `event` on the live stream
    pub fn emit(&self, event: Uevent) {
        self.remember(&event);
        if self.sender.send(event).is_err() {
            tracing::debug!("Nobody listens for device events any more");
        }
    }

    /// Emit `event` from a helper thread once `delay` has passed
    pub fn emit_after(self: &Arc<Self>, delay: Duration, event: Uevent) -> JoinHandle<()> {
        let source = self.clone();
        std::thread::spawn(move || {
            std::thread::sleep(delay);
            source.emit(event);
        })
    }

    /// Syspaths `trigger_change` was called for, in order
    pub fn triggered(&self) -> Vec<String> {
        lock(&self.triggered).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl DeviceSource for ChannelDeviceSource {
    fn enumerate(&self) -> Result<Vec<Device>, StorageError> {
        Ok(lock(&self.devices).values().cloned().collect())
    }

    fn lookup(&self, syspath: &str) -> Result<Option<Device>, StorageError> {
        Ok(lock(&self.devices).get(syspath).cloned())
    }

    fn trigger_change(&self, syspath: &str) -> Result<(), StorageError> {
        lock(&self.triggered).push(syspath.to_string());
        let device = lock(&self.devices).get(syspath).cloned();
        if let Some(device) = device {
            self.emit(Uevent::change(device));
        }
        Ok(())
    }

    fn events(&self) -> Result<BoxStream<'static, Uevent>, StorageError> {
        let receiver = lock(&self.receiver)
            .take()
            .ok_or_else(|| StorageError::failed("device events were already taken"))?;
        Ok(stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|event| (event, receiver))
        })
        .boxed())
    }
}
