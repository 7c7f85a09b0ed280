// SPDX-License-Identifier: GPL-3.0-only

use async_trait::async_trait;
use storage_service::BusEvent;
use storage_service::core_interfaces::BLOCK_INTERFACE;
use storage_service::modules::btrfs::FILESYSTEM_BTRFS_INTERFACE;
use storage_testing::{TestDaemon, fixtures};
use storage_types::{BtrfsInfo, ObjectPath, Uevent};

use crate::Scenario;

pub struct BtrfsPresenceFlip;

fn interface_names(bench: &TestDaemon, path: &ObjectPath) -> Vec<String> {
    bench
        .object(path)
        .map(|object| object.interfaces.keys().cloned().collect())
        .unwrap_or_default()
}

#[async_trait]
impl Scenario for BtrfsPresenceFlip {
    fn id(&self) -> &'static str {
        "btrfs.presence_flip"
    }

    fn suite(&self) -> &'static str {
        "btrfs"
    }

    async fn execute(&self) -> storage_testing::errors::Result<()> {
        let mut bench = TestDaemon::with_modules(&["btrfs"])?;
        bench.fakes.blocklib.set_btrfs("/dev/sdb1", BtrfsInfo::default());
        let path = ObjectPath::for_block_device("/dev/sdb1");

        bench.emit(Uevent::add(fixtures::block("sdb1", "ext4")));
        assert_eq!(interface_names(&bench, &path), vec![BLOCK_INTERFACE]);

        let events = bench.emit(Uevent::change(fixtures::block("sdb1", "btrfs")));
        assert!(events.iter().any(|event| matches!(
            event,
            BusEvent::InterfacesAdded { path: added, interfaces }
                if added == &path && interfaces.contains_key(FILESYSTEM_BTRFS_INTERFACE)
        )));
        assert_eq!(
            interface_names(&bench, &path),
            vec![BLOCK_INTERFACE, FILESYSTEM_BTRFS_INTERFACE]
        );

        let events = bench.emit(Uevent::change(fixtures::block("sdb1", "ext4")));
        assert!(events.iter().any(|event| matches!(
            event,
            BusEvent::InterfacesRemoved { path: removed, interfaces }
                if removed == &path && interfaces == &vec![FILESYSTEM_BTRFS_INTERFACE.to_string()]
        )));
        assert_eq!(interface_names(&bench, &path), vec![BLOCK_INTERFACE]);
        Ok(())
    }
}
