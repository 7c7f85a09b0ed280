// SPDX-License-Identifier: GPL-3.0-only

use async_trait::async_trait;
use storage_service::modules::dummy::loop_pool_path;
use storage_testing::probe::{PROBE_INTERFACE, group_path};
use storage_testing::recorder::describe_all;
use storage_testing::{TestDaemon, fixtures};
use storage_types::{PropertyValue, Uevent};

use crate::Scenario;

pub struct ClaimsReleaseWithoutFactory;

#[async_trait]
impl Scenario for ClaimsReleaseWithoutFactory {
    fn id(&self) -> &'static str {
        "claims.release.without_factory"
    }

    fn suite(&self) -> &'static str {
        "claims"
    }

    async fn execute(&self) -> storage_testing::errors::Result<()> {
        let mut bench = TestDaemon::with_modules(&["dummy", "probe"])?;
        let vd0 = fixtures::probed("vd0", "fast");
        let vd1 = fixtures::probed("vd1", "fast");
        let group = group_path("fast");
        let probe = bench.fakes.probe.clone();

        bench.emit(Uevent::add(vd0.clone()));
        bench.emit(Uevent::add(vd1.clone()));
        assert_eq!(probe.factory_calls(), 1, "vd1 joins the existing group");
        assert_eq!(bench.daemon.claims().claims_of(&group).len(), 2);

        bench.emit(Uevent::remove(vd0.clone()));
        let object = bench.object(&group).expect("group outlives its first member");
        assert_eq!(
            object.interface(PROBE_INTERFACE).map(|bag| &bag["num_devices"]),
            Some(&PropertyValue::U64(1))
        );
        assert!(bench.daemon.claims().owners_of(vd0.syspath()).is_empty());

        let events = describe_all(&bench.emit(Uevent::remove(vd1.clone())));
        assert!(events.contains(&"removed /probe/fast [Probe]".to_string()), "{events:?}");
        assert!(bench.object(&group).is_none());
        assert_eq!(probe.factory_calls(), 1, "releasing removes never reach the factory");

        // The same holds for the loop pool
        let loop0 = fixtures::bound_loop(0, "/srv/images/a.img");
        let loop1 = fixtures::bound_loop(1, "/srv/images/b.img");
        bench.emit(Uevent::add(loop0.clone()));
        bench.emit(Uevent::add(loop1.clone()));
        bench.emit(Uevent::remove(loop0));
        assert!(bench.object(&loop_pool_path()).is_some());
        let events = describe_all(&bench.emit(Uevent::remove(loop1)));
        assert_eq!(
            events,
            vec![
                "removed /block_devices/loop1 [Block]",
                "removed /dummy/loops [Dummy.LoopPool]",
            ]
        );
        assert!(bench.daemon.claims().object_paths().is_empty());
        Ok(())
    }
}
