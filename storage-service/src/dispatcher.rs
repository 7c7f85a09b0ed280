// SPDX-License-Identifier: GPL-3.0-only

//! The single consumer of device events
//!
//! Each event is handled to completion before the next one starts: drive
//! and block objects are updated first, then module objects get the event
//! through the claim registry, then the object manager flushes the bus
//! notifications the event caused.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use storage_contracts::DeviceSource;
use storage_types::{Device, ObjectPath, Uevent, UeventAction};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::attacher::sync_interfaces;
use crate::claims::ClaimRegistry;
use crate::core_interfaces::{BlockEntry, DriveEntry};
use crate::error::Result;
use crate::housekeeping::HousekeepingTargets;
use crate::interface::InterfaceEntry;
use crate::module::{ModuleDescriptor, ModuleRegistry};
use crate::object::{ObjectKind, TypedObject, block_path};
use crate::object_manager::{ExportedObject, ObjectManager};

/// Work for the dispatcher task
#[derive(Debug, Clone)]
pub enum DispatchItem {
    Uevent(Uevent),
    /// Re-enumerate the device source and reconcile every object
    Rescan,
    /// Re-publish a module object after housekeeping changed it
    Resync(ObjectPath),
    /// Ask the kernel to re-announce the devices behind these block objects
    TriggerChange(Vec<ObjectPath>),
}

/// Kernel names that never get a drive object
const VIRTUAL_PREFIXES: &[&str] = &["loop", "zram", "dm-", "md", "bcache", "ram", "nbd"];

pub struct Dispatcher {
    objects: Arc<ObjectManager>,
    registry: Arc<ModuleRegistry>,
    source: Arc<dyn DeviceSource>,
    core_block: Vec<Arc<dyn InterfaceEntry>>,
    core_drive: Vec<Arc<dyn InterfaceEntry>>,
    blocks: HashMap<String, TypedObject>,
    drives: HashMap<String, TypedObject>,
    /// Drive identifier of every drive member, by syspath
    drive_of: HashMap<String, String>,
    claims: ClaimRegistry,
}

impl Dispatcher {
    pub fn new(
        objects: Arc<ObjectManager>,
        registry: Arc<ModuleRegistry>,
        source: Arc<dyn DeviceSource>,
        housekeeping: HousekeepingTargets,
    ) -> Self {
        Self {
            objects,
            registry,
            source,
            core_block: vec![Arc::new(BlockEntry)],
            core_drive: vec![Arc::new(DriveEntry)],
            blocks: HashMap::new(),
            drives: HashMap::new(),
            drive_of: HashMap::new(),
            claims: ClaimRegistry::new(housekeeping),
        }
    }

    pub fn claims(&self) -> &ClaimRegistry {
        &self.claims
    }

    /// Feed every present device as a synthetic `add`, parents first
    pub fn coldplug(&mut self) -> Result<()> {
        let devices = self.source.enumerate()?;
        tracing::info!("Coldplugging {} devices", devices.len());
        for device in topological_order(devices) {
            self.handle_uevent(UeventAction::Add, Arc::new(device));
        }
        Ok(())
    }

    pub async fn run(
        mut self,
        mut items: mpsc::UnboundedReceiver<DispatchItem>,
        cancel: CancellationToken,
    ) {
        loop {
            let item = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                item = items.recv() => match item {
                    Some(item) => item,
                    None => break,
                },
            };
            self.handle(item);
        }
        tracing::debug!("Dispatcher stopped");
    }

    pub fn handle(&mut self, item: DispatchItem) {
        match item {
            DispatchItem::Uevent(uevent) => self.handle_uevent(uevent.action, uevent.device),
            DispatchItem::Rescan => {
                if let Err(e) = self.rescan() {
                    tracing::warn!("Rescan failed: {e}");
                }
            }
            DispatchItem::Resync(path) => {
                self.claims.resync(&path, &self.objects);
                self.objects.flush();
            }
            DispatchItem::TriggerChange(paths) => self.trigger_change(&paths),
        }
    }

    fn handle_uevent(&mut self, action: UeventAction, device: Arc<Device>) {
        tracing::debug!("{action} {}", device.syspath());
        let modules = self.registry.iter();
        self.claims.sync_modules(&modules);

        if device.is_block() {
            self.update_drive(action, &device, &modules);
            self.update_block(action, &device, &modules);
        }
        self.claims.route(action, &device, &self.objects);
        self.objects.flush();
    }

    fn rescan(&mut self) -> Result<()> {
        let present = self.source.enumerate()?;
        let present_syspaths: HashSet<&str> = present.iter().map(Device::syspath).collect();
        let vanished: Vec<Arc<Device>> = self
            .blocks
            .iter()
            .filter(|(syspath, _)| !present_syspaths.contains(syspath.as_str()))
            .filter_map(|(_, block)| block.device().cloned())
            .collect();
        tracing::info!(
            "Rescanning {} devices, {} vanished",
            present.len(),
            vanished.len()
        );

        for device in vanished {
            self.handle_uevent(UeventAction::Remove, device);
        }
        for device in topological_order(present) {
            let action = if self.blocks.contains_key(device.syspath()) {
                UeventAction::Change
            } else {
                UeventAction::Add
            };
            self.handle_uevent(action, Arc::new(device));
        }
        Ok(())
    }

    fn trigger_change(&self, paths: &[ObjectPath]) {
        for path in paths {
            let Some(block) = self.blocks.values().find(|block| &block.path == path) else {
                tracing::warn!("Cannot trigger change on {path}: not a block object");
                continue;
            };
            let Some(device) = block.device() else {
                continue;
            };
            if let Err(e) = self.source.trigger_change(device.syspath()) {
                tracing::warn!("Failed to trigger change on {}: {e}", device.syspath());
            }
        }
    }

    fn entries(&self, modules: &[Arc<ModuleDescriptor>], drive: bool) -> Vec<Arc<dyn InterfaceEntry>> {
        let core = if drive { &self.core_drive } else { &self.core_block };
        core.iter()
            .cloned()
            .chain(modules.iter().flat_map(|module| {
                if drive {
                    module.drive_entries.clone()
                } else {
                    module.block_entries.clone()
                }
            }))
            .collect()
    }

    fn update_drive(&mut self, action: UeventAction, device: &Arc<Device>, modules: &[Arc<ModuleDescriptor>]) {
        let syspath = device.syspath();
        let current = if action == UeventAction::Remove {
            None
        } else {
            drive_vpd(device)
        };
        if let Some(previous) = self.drive_of.get(syspath).cloned()
            && Some(&previous) != current.as_ref()
        {
            self.leave_drive(&previous, syspath, modules);
        }
        let Some(vpd) = current else {
            return;
        };

        let entries = self.entries(modules, true);
        self.drive_of.insert(syspath.to_string(), vpd.clone());
        if let Some(drive) = self.drives.get_mut(&vpd) {
            if let ObjectKind::Drive { devices, .. } = &mut drive.kind {
                devices.insert(syspath.to_string(), device.clone());
            }
            let changes = sync_interfaces(drive, Some(action), &entries);
            if let Err(e) = self.objects.apply(&drive.path, changes) {
                tracing::error!("{e}");
            }
            return;
        }

        let mut drive = TypedObject::drive(&vpd);
        if let ObjectKind::Drive { devices, .. } = &mut drive.kind {
            devices.insert(syspath.to_string(), device.clone());
        }
        sync_interfaces(&mut drive, Some(action), &entries);
        match self
            .objects
            .register(ExportedObject::new(drive.path.clone(), drive.exported_interfaces()))
        {
            Ok(()) => {
                self.drives.insert(vpd, drive);
            }
            Err(e) => {
                tracing::error!("Discarding drive for {syspath}: {e}");
                self.drive_of.remove(syspath);
            }
        }
    }

    fn leave_drive(&mut self, vpd: &str, syspath: &str, modules: &[Arc<ModuleDescriptor>]) {
        self.drive_of.remove(syspath);
        let entries = self.entries(modules, true);
        let Some(drive) = self.drives.get_mut(vpd) else {
            return;
        };
        let now_empty = match &mut drive.kind {
            ObjectKind::Drive { devices, .. } => {
                devices.remove(syspath);
                devices.is_empty()
            }
            ObjectKind::Block { .. } => true,
        };

        if now_empty {
            if let Some(mut drive) = self.drives.remove(vpd) {
                sync_interfaces(&mut drive, Some(UeventAction::Remove), &entries);
                self.objects.unregister(&drive.path);
                self.relink_blocks(&drive.path, syspath, modules);
            }
        } else {
            let changes = sync_interfaces(drive, Some(UeventAction::Change), &entries);
            if let Err(e) = self.objects.apply(&drive.path, changes) {
                tracing::error!("{e}");
            }
        }
    }

    /// Point blocks still linked to the removed drive `dead` at their current drive
    ///
    /// `skip` is the device being handled, which `update_block` takes care of.
    fn relink_blocks(&mut self, dead: &ObjectPath, skip: &str, modules: &[Arc<ModuleDescriptor>]) {
        let stale: Vec<String> = self
            .blocks
            .iter()
            .filter(|(syspath, block)| {
                syspath.as_str() != skip
                    && matches!(&block.kind, ObjectKind::Block { drive: Some(drive), .. } if drive == dead)
            })
            .map(|(syspath, _)| syspath.clone())
            .collect();
        if stale.is_empty() {
            return;
        }

        let entries = self.entries(modules, false);
        for syspath in stale {
            let drive = match self.blocks.get(&syspath).and_then(TypedObject::device) {
                Some(device) => self.drive_path_for(device),
                None => continue,
            };
            let Some(block) = self.blocks.get_mut(&syspath) else {
                continue;
            };
            if let ObjectKind::Block { drive: link, .. } = &mut block.kind {
                *link = drive;
            }
            let changes = sync_interfaces(block, Some(UeventAction::Change), &entries);
            if let Err(e) = self.objects.apply(&block.path, changes) {
                tracing::error!("{e}");
            }
        }
    }

    fn update_block(&mut self, action: UeventAction, device: &Arc<Device>, modules: &[Arc<ModuleDescriptor>]) {
        let syspath = device.syspath();
        let entries = self.entries(modules, false);

        if action == UeventAction::Remove {
            match self.blocks.remove(syspath) {
                Some(mut block) => {
                    sync_interfaces(&mut block, Some(action), &entries);
                    self.objects.unregister(&block.path);
                }
                None => tracing::debug!("Ignoring remove of unknown device {syspath}"),
            }
            return;
        }

        let drive = self.drive_path_for(device);

        // A renamed device node moves the object to a new path
        let renamed = self
            .blocks
            .get(syspath)
            .is_some_and(|block| block.path != block_path(device));
        if renamed && let Some(old) = self.blocks.remove(syspath) {
            self.objects.unregister(&old.path);
        }

        if let Some(block) = self.blocks.get_mut(syspath) {
            block.kind = ObjectKind::Block {
                device: device.clone(),
                drive,
            };
            let changes = sync_interfaces(block, Some(action), &entries);
            if let Err(e) = self.objects.apply(&block.path, changes) {
                tracing::error!("{e}");
            }
            return;
        }

        let mut block = TypedObject::block(device.clone(), drive);
        sync_interfaces(&mut block, Some(action), &entries);
        match self
            .objects
            .register(ExportedObject::new(block.path.clone(), block.exported_interfaces()))
        {
            Ok(()) => {
                self.blocks.insert(syspath.to_string(), block);
            }
            Err(e) => tracing::error!("Discarding block object for {syspath}: {e}"),
        }
    }

    fn drive_path_for(&self, device: &Device) -> Option<ObjectPath> {
        self.drive_of
            .get(device.syspath())
            .or_else(|| device.parent().and_then(|parent| self.drive_of.get(parent)))
            .map(|vpd| ObjectPath::for_drive(vpd))
    }
}

fn drive_vpd(device: &Device) -> Option<String> {
    let name = device.sysname();
    if !device.is_whole_disk() || VIRTUAL_PREFIXES.iter().any(|prefix| name.starts_with(prefix)) {
        return None;
    }
    device.vpd().map(ToString::to_string)
}

/// Order devices so that every parent comes before its children
fn topological_order(devices: Vec<Device>) -> Vec<Device> {
    let index: HashMap<&str, usize> = devices
        .iter()
        .enumerate()
        .map(|(i, device)| (device.syspath(), i))
        .collect();

    let mut children = vec![Vec::new(); devices.len()];
    let mut ready = VecDeque::new();
    for (i, device) in devices.iter().enumerate() {
        match device.parent().and_then(|parent| index.get(parent)) {
            Some(&parent) if parent != i => children[parent].push(i),
            _ => ready.push_back(i),
        }
    }

    let mut order = Vec::with_capacity(devices.len());
    let mut seen = vec![false; devices.len()];
    while let Some(i) = ready.pop_front() {
        if std::mem::replace(&mut seen[i], true) {
            continue;
        }
        order.push(i);
        ready.extend(children[i].iter().copied());
    }
    // Parent cycles cannot come from sysfs, but never drop a device
    order.extend((0..devices.len()).filter(|i| !seen[*i]));

    let mut slots: Vec<Option<Device>> = devices.into_iter().map(Some).collect();
    order
        .into_iter()
        .filter_map(|i| slots[i].take())
        .collect()
}

#[cfg(test)]
mod tests {
    use storage_types::PropertyValue;

    use super::*;
    use crate::core_interfaces::{BLOCK_INTERFACE, DRIVE_INTERFACE};
    use crate::module::ModuleCatalog;
    use crate::object_manager::BusEvent;
    use crate::test_support::StubSource;

    fn disk() -> Device {
        Device::builder("/sys/devices/pci0000:00/block/sdb")
            .devtype("disk")
            .device_file("/dev/sdb")
            .property("ID_SERIAL", "WDC_WD10_123")
            .property("ID_MODEL", "WD10")
            .attribute("size", "4096")
            .build()
    }

    fn partition(fs_type: &str) -> Device {
        Device::builder("/sys/devices/pci0000:00/block/sdb/sdb1")
            .devtype("partition")
            .device_file("/dev/sdb1")
            .parent("/sys/devices/pci0000:00/block/sdb")
            .property("ID_FS_TYPE", fs_type)
            .build()
    }

    fn dispatcher(devices: Vec<Device>) -> (Dispatcher, Arc<ObjectManager>, Arc<StubSource>) {
        let objects = Arc::new(ObjectManager::default());
        let registry = Arc::new(ModuleRegistry::new(ModuleCatalog::empty()));
        let source = Arc::new(StubSource::new(devices));
        let dispatcher = Dispatcher::new(
            objects.clone(),
            registry,
            source.clone(),
            HousekeepingTargets::default(),
        );
        (dispatcher, objects, source)
    }

    #[test]
    fn coldplug_delivers_parents_first() {
        let order = topological_order(vec![partition("ext4"), disk()]);
        assert_eq!(order[0].sysname(), "sdb");
        assert_eq!(order[1].sysname(), "sdb1");
    }

    #[test]
    fn whole_disk_gets_drive_and_partition_links_to_it() {
        let (mut dispatcher, objects, _) = dispatcher(vec![partition("ext4"), disk()]);
        dispatcher.coldplug().expect("coldplug");

        let drive_path = ObjectPath::for_drive("WDC_WD10_123");
        let drive = objects.get(&drive_path).expect("drive object");
        assert_eq!(
            drive.interface(DRIVE_INTERFACE).and_then(|bag| bag.get("Model")),
            Some(&PropertyValue::from("WD10"))
        );

        let sdb1 = objects
            .get(&ObjectPath::for_block_device("/dev/sdb1"))
            .expect("partition object");
        assert_eq!(
            sdb1.interface(BLOCK_INTERFACE).and_then(|bag| bag.get("Drive")),
            Some(&PropertyValue::Path(drive_path.clone()))
        );

        dispatcher.handle(DispatchItem::Uevent(Uevent::remove(disk())));
        assert!(objects.get(&drive_path).is_none());
    }

    #[test]
    fn partition_drops_drive_link_when_drive_goes_away() {
        let (mut dispatcher, objects, _) = dispatcher(vec![partition("ext4"), disk()]);
        dispatcher.coldplug().expect("coldplug");
        let mut events = objects.subscribe();

        // The disk loses its identity, so no drive object can back it
        let anonymous = Device::builder("/sys/devices/pci0000:00/block/sdb")
            .devtype("disk")
            .device_file("/dev/sdb")
            .attribute("size", "4096")
            .build();
        dispatcher.handle(DispatchItem::Uevent(Uevent::change(anonymous)));

        assert!(objects.get(&ObjectPath::for_drive("WDC_WD10_123")).is_none());
        let sdb1 = objects
            .get(&ObjectPath::for_block_device("/dev/sdb1"))
            .expect("partition object");
        assert_eq!(
            sdb1.interface(BLOCK_INTERFACE).and_then(|bag| bag.get("Drive")),
            Some(&PropertyValue::Path(ObjectPath::none()))
        );

        let relinked = std::iter::from_fn(|| events.try_recv().ok()).any(|event| {
            matches!(
                &event,
                BusEvent::PropertiesChanged { path, changed, .. }
                    if path == &ObjectPath::for_block_device("/dev/sdb1") && changed.contains_key("Drive")
            )
        });
        assert!(relinked);
    }

    #[test]
    fn repeated_change_is_silent() {
        let (mut dispatcher, objects, _) = dispatcher(Vec::new());
        dispatcher.handle(DispatchItem::Uevent(Uevent::add(partition("ext4"))));
        dispatcher.handle(DispatchItem::Uevent(Uevent::change(partition("btrfs"))));
        let snapshot = objects.iter();

        let mut events = objects.subscribe();
        dispatcher.handle(DispatchItem::Uevent(Uevent::change(partition("btrfs"))));
        assert!(events.try_recv().is_err());
        assert_eq!(objects.iter(), snapshot);
    }

    #[test]
    fn change_only_sends_delta() {
        let (mut dispatcher, objects, _) = dispatcher(Vec::new());
        dispatcher.handle(DispatchItem::Uevent(Uevent::add(partition("ext4"))));
        let mut events = objects.subscribe();

        dispatcher.handle(DispatchItem::Uevent(Uevent::change(partition("btrfs"))));
        let Ok(BusEvent::PropertiesChanged { changed, .. }) = events.try_recv() else {
            panic!("expected a property change");
        };
        assert_eq!(changed.len(), 1);
        assert_eq!(changed.get("IdType"), Some(&PropertyValue::from("btrfs")));
    }

    #[test]
    fn remove_of_unknown_device_is_ignored() {
        let (mut dispatcher, objects, _) = dispatcher(Vec::new());
        dispatcher.handle(DispatchItem::Uevent(Uevent::remove(partition("ext4"))));
        assert!(objects.is_empty());
    }

    #[test]
    fn rescan_removes_vanished_devices() {
        let (mut dispatcher, objects, source) = dispatcher(vec![disk(), partition("ext4")]);
        dispatcher.coldplug().expect("coldplug");
        assert_eq!(objects.len(), 3);

        source.set_devices(vec![disk()]);
        dispatcher.handle(DispatchItem::Rescan);
        assert!(objects.get(&ObjectPath::for_block_device("/dev/sdb1")).is_none());
        assert_eq!(objects.len(), 2);
    }

    #[test]
    fn trigger_change_goes_to_the_source() {
        let (mut dispatcher, _, source) = dispatcher(Vec::new());
        dispatcher.handle(DispatchItem::Uevent(Uevent::add(partition("ext4"))));
        dispatcher.handle(DispatchItem::TriggerChange(vec![
            ObjectPath::for_block_device("/dev/sdb1"),
            ObjectPath::root().child("nowhere"),
        ]));
        assert_eq!(
            source.triggered(),
            vec!["/sys/devices/pci0000:00/block/sdb/sdb1".to_string()]
        );
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let (dispatcher, objects, _) = dispatcher(Vec::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(dispatcher.run(rx, cancel.clone()));

        tx.send(DispatchItem::Uevent(Uevent::add(disk()))).expect("send");
        objects
            .wait_for(|object| object.path.name() == "sdb", Some(std::time::Duration::from_secs(2)))
            .await
            .expect("processed");

        cancel.cancel();
        task.await.expect("dispatcher exits");
    }
}
