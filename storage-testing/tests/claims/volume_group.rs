// SPDX-License-Identifier: GPL-3.0-only

use async_trait::async_trait;
use storage_service::modules::lvm2::{VOLUME_GROUP_INTERFACE, volume_group_path};
use storage_testing::{TestDaemon, fixtures};
use storage_types::{PropertyValue, Uevent};

use crate::Scenario;

pub struct ClaimsVolumeGroupMembers;

#[async_trait]
impl Scenario for ClaimsVolumeGroupMembers {
    fn id(&self) -> &'static str {
        "claims.volume_group.members"
    }

    fn suite(&self) -> &'static str {
        "claims"
    }

    async fn execute(&self) -> storage_testing::errors::Result<()> {
        let mut bench = TestDaemon::with_modules(&["lvm2"])?;
        bench.fakes.blocklib.set_physical_volume("/dev/sdb1", "vg0");
        bench.fakes.blocklib.set_physical_volume("/dev/sdc1", "vg0");
        let sdb1 = fixtures::block("sdb1", "LVM2_member");
        let sdc1 = fixtures::block("sdc1", "LVM2_member");
        let vg0 = volume_group_path("vg0");

        bench.emit(Uevent::add(sdb1.clone()));
        bench.emit(Uevent::add(sdc1.clone()));
        // A plain filesystem is offered to the group but stays unclaimed
        bench.emit(Uevent::add(fixtures::block("sdd1", "xfs")));

        let object = bench.object(&vg0).expect("vg0 is exported");
        let bag = object.interface(VOLUME_GROUP_INTERFACE).expect("VolumeGroup interface");
        assert_eq!(bag["Name"], PropertyValue::from("vg0"));
        assert_eq!(bag["NumPhysicalVolumes"], PropertyValue::U64(2));
        assert_eq!(
            bench.daemon.claims().claims_of(&vg0),
            vec![sdb1.syspath().to_string(), sdc1.syspath().to_string()]
        );
        assert!(bench.daemon.claims().owners_of("/sys/block/sdd1").is_empty());

        bench.emit(Uevent::remove(sdb1));
        bench.emit(Uevent::remove(sdc1));
        assert!(bench.object(&vg0).is_none());
        Ok(())
    }
}
