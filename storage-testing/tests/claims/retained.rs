// SPDX-License-Identifier: GPL-3.0-only

use async_trait::async_trait;
use storage_testing::probe::{PROBE_INTERFACE, group_path};
use storage_testing::recorder::describe_all;
use storage_testing::{TestDaemon, fixtures};
use storage_types::{PropertyValue, Uevent};

use crate::Scenario;

pub struct ClaimsKeptOwnerDropsRemoved;

#[async_trait]
impl Scenario for ClaimsKeptOwnerDropsRemoved {
    fn id(&self) -> &'static str {
        "claims.release.kept_owner"
    }

    fn suite(&self) -> &'static str {
        "claims"
    }

    async fn execute(&self) -> storage_testing::errors::Result<()> {
        let mut bench = TestDaemon::with_modules(&["probe"])?;
        let vd0 = fixtures::probed_retained("vd0", "fast");
        let vd1 = fixtures::probed_retained("vd1", "fast");
        let group = group_path("fast");
        let probe = bench.fakes.probe.clone();

        bench.emit(Uevent::add(vd0.clone()));
        bench.emit(Uevent::add(vd1.clone()));
        assert_eq!(probe.factory_calls(), 1);

        // The owner keeps itself, but vd0 is no longer claimed
        bench.emit(Uevent::remove(vd0.clone()));
        assert!(bench.daemon.claims().owners_of(vd0.syspath()).is_empty());
        assert_eq!(
            bench.daemon.claims().claims_of(&group),
            vec![vd1.syspath().to_string()]
        );
        let object = bench.object(&group).expect("group kept");
        assert_eq!(
            object.interface(PROBE_INTERFACE).map(|bag| &bag["num_devices"]),
            Some(&PropertyValue::U64(1))
        );

        // A device moving to another group is released, and the factory that
        // would take it is not asked during the same event
        let moved = fixtures::probed("vd1", "slow");
        bench.emit(Uevent::change(moved.clone()));
        assert!(bench.object(&group).is_none());
        assert!(bench.object(&group_path("slow")).is_none());
        assert_eq!(probe.factory_calls(), 1);

        let events = describe_all(&bench.emit(Uevent::change(moved)));
        assert!(events.contains(&"added /probe/slow [Probe]".to_string()), "{events:?}");
        assert_eq!(probe.factory_calls(), 2);

        // The last member releasing on remove takes the object with it
        let events = describe_all(&bench.emit(Uevent::remove(fixtures::probed_retained("vd1", "slow"))));
        assert!(events.contains(&"removed /probe/slow [Probe]".to_string()), "{events:?}");
        assert_eq!(probe.factory_calls(), 2);
        assert!(bench.daemon.claims().object_paths().is_empty());
        Ok(())
    }
}
