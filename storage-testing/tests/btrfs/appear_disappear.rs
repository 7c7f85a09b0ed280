// SPDX-License-Identifier: GPL-3.0-only

use async_trait::async_trait;
use storage_service::modules::btrfs::FILESYSTEM_BTRFS_INTERFACE;
use storage_testing::recorder::describe_all;
use storage_testing::{TestDaemon, fixtures};
use storage_types::{BtrfsInfo, ObjectPath, PropertyValue, Uevent};

use crate::Scenario;

pub struct BtrfsAppearDisappear;

#[async_trait]
impl Scenario for BtrfsAppearDisappear {
    fn id(&self) -> &'static str {
        "btrfs.appear_disappear"
    }

    fn suite(&self) -> &'static str {
        "btrfs"
    }

    async fn execute(&self) -> storage_testing::errors::Result<()> {
        let mut bench = TestDaemon::with_modules(&["btrfs"])?;
        bench.fakes.blocklib.set_btrfs(
            "/dev/sdb1",
            BtrfsInfo {
                label: "scratch".to_string(),
                uuid: "5e0b3c1a-77f2-4d4e-9a2b-0d1c2e3f4a5b".to_string(),
                num_devices: 1,
                ..Default::default()
            },
        );
        let sdb1 = fixtures::block("sdb1", "btrfs");
        let path = ObjectPath::for_block_device("/dev/sdb1");

        let added = describe_all(&bench.emit(Uevent::add(sdb1.clone())));
        assert_eq!(added, vec!["added /block_devices/sdb1 [Block, Filesystem.BTRFS]"]);
        let object = bench.object(&path).expect("sdb1 is exported");
        assert_eq!(
            object.interface(FILESYSTEM_BTRFS_INTERFACE).map(|bag| &bag["label"]),
            Some(&PropertyValue::from("scratch"))
        );

        bench.fakes.blocklib.set_btrfs_label("/dev/sdb1", "data");
        let changed = describe_all(&bench.emit(Uevent::change(sdb1.clone())));
        assert_eq!(
            changed,
            vec!["changed /block_devices/sdb1 Filesystem.BTRFS {label=data}"]
        );

        let removed = describe_all(&bench.emit(Uevent::remove(sdb1)));
        assert_eq!(
            removed,
            vec!["removed /block_devices/sdb1 [Block, Filesystem.BTRFS]"]
        );
        assert!(bench.object(&path).is_none());
        Ok(())
    }
}
