// SPDX-License-Identifier: GPL-3.0-only

use async_trait::async_trait;
use storage_service::BusEvent;
use storage_service::modules::dummy::{LOOP_POOL_INTERFACE, loop_pool_path};
use storage_testing::recorder::describe_all;
use storage_testing::{TestDaemon, fixtures};
use storage_types::{PropertyValue, Uevent};

use crate::Scenario;

pub struct ClaimsLoopPoolAbsorbs;

#[async_trait]
impl Scenario for ClaimsLoopPoolAbsorbs {
    fn id(&self) -> &'static str {
        "claims.loop_pool.absorbs"
    }

    fn suite(&self) -> &'static str {
        "claims"
    }

    async fn execute(&self) -> storage_testing::errors::Result<()> {
        let mut bench = TestDaemon::with_modules(&["dummy"])?;
        let loop0 = fixtures::bound_loop(0, "/srv/images/a.img");
        let loop1 = fixtures::bound_loop(1, "/srv/images/b.img");
        let pool = loop_pool_path();

        let events = describe_all(&bench.emit(Uevent::add(loop0.clone())));
        assert_eq!(
            events,
            vec![
                "added /block_devices/loop0 [Block]",
                "added /dummy/loops [Dummy.LoopPool]",
            ]
        );

        let events = bench.emit(Uevent::add(loop1.clone()));
        let pool_changes: Vec<_> = events
            .iter()
            .filter_map(|event| match event {
                BusEvent::PropertiesChanged {
                    path,
                    interface,
                    changed,
                } if path == &pool && interface == LOOP_POOL_INTERFACE => Some(changed),
                _ => None,
            })
            .collect();
        assert_eq!(pool_changes.len(), 1, "pool changes: {pool_changes:?}");
        assert_eq!(pool_changes[0]["num_devices"], PropertyValue::U64(2));
        assert!(
            !events
                .iter()
                .any(|event| matches!(event, BusEvent::InterfacesAdded { path, .. } if path == &pool)),
            "loop1 must join the existing pool"
        );

        let claims = bench.daemon.claims();
        assert_eq!(
            claims.claims_of(&pool),
            vec![loop0.syspath().to_string(), loop1.syspath().to_string()]
        );
        assert_eq!(claims.owners_of(loop1.syspath()), vec![pool.clone()]);
        assert_eq!(claims.object_paths(), vec![pool]);
        Ok(())
    }
}
