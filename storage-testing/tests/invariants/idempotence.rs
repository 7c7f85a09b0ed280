// SPDX-License-Identifier: GPL-3.0-only

use async_trait::async_trait;
use storage_service::modules::btrfs::FILESYSTEM_BTRFS_INTERFACE;
use storage_testing::recorder::describe_all;
use storage_testing::{TestDaemon, fixtures};
use storage_types::{BtrfsInfo, ObjectPath, Uevent};

use crate::Scenario;

fn bench() -> storage_testing::errors::Result<TestDaemon> {
    let bench = TestDaemon::with_modules(&["btrfs", "dummy"])?;
    bench.fakes.blocklib.set_btrfs(
        "/dev/sdb1",
        BtrfsInfo {
            label: "scratch".to_string(),
            ..Default::default()
        },
    );
    Ok(bench)
}

pub struct InvariantsRepeatedChangeIsSilent;

#[async_trait]
impl Scenario for InvariantsRepeatedChangeIsSilent {
    fn id(&self) -> &'static str {
        "invariants.repeated_change_is_silent"
    }

    fn suite(&self) -> &'static str {
        "invariants"
    }

    async fn execute(&self) -> storage_testing::errors::Result<()> {
        let mut bench = bench()?;
        let sdb1 = fixtures::block("sdb1", "btrfs");
        let loop0 = fixtures::bound_loop(0, "/srv/images/a.img");
        bench.emit(Uevent::add(sdb1.clone()));
        bench.emit(Uevent::add(loop0.clone()));
        let exported = bench.objects().len();

        for _ in 0..2 {
            assert!(bench.emit(Uevent::change(sdb1.clone())).is_empty());
            assert!(bench.emit(Uevent::change(loop0.clone())).is_empty());
        }
        assert_eq!(bench.objects().len(), exported);
        Ok(())
    }
}

pub struct InvariantsStrayRemoveIsIgnored;

#[async_trait]
impl Scenario for InvariantsStrayRemoveIsIgnored {
    fn id(&self) -> &'static str {
        "invariants.stray_remove_is_ignored"
    }

    fn suite(&self) -> &'static str {
        "invariants"
    }

    async fn execute(&self) -> storage_testing::errors::Result<()> {
        let mut bench = bench()?;
        bench.emit(Uevent::add(fixtures::block("sdb1", "btrfs")));
        let before = bench.objects().len();

        let events = bench.emit(Uevent::remove(fixtures::bound_loop(9, "/srv/images/gone.img")));
        assert!(events.is_empty(), "{:?}", describe_all(&events));
        assert_eq!(bench.objects().len(), before);
        Ok(())
    }
}

pub struct InvariantsReaddKeepsPath;

#[async_trait]
impl Scenario for InvariantsReaddKeepsPath {
    fn id(&self) -> &'static str {
        "invariants.readd_keeps_path"
    }

    fn suite(&self) -> &'static str {
        "invariants"
    }

    async fn execute(&self) -> storage_testing::errors::Result<()> {
        let mut bench = bench()?;
        let sdb1 = fixtures::block("sdb1", "btrfs");
        let path = ObjectPath::for_block_device("/dev/sdb1");

        let first = describe_all(&bench.emit(Uevent::add(sdb1.clone())));
        bench.emit(Uevent::remove(sdb1.clone()));
        assert!(bench.object(&path).is_none());
        let second = describe_all(&bench.emit(Uevent::add(sdb1)));

        assert_eq!(first, second);
        let object = bench.object(&path).expect("sdb1 is back");
        assert!(object.has_interface(FILESYSTEM_BTRFS_INTERFACE));
        Ok(())
    }
}
