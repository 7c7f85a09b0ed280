// SPDX-License-Identifier: GPL-3.0-only

use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use storage_testing::probe::group_path;
use storage_testing::{TestDaemon, TestingError, fixtures};

use crate::Scenario;

const SHUTDOWN_AFTER: Duration = Duration::from_millis(250);
const SHUTDOWN_BUDGET: Duration = Duration::from_millis(350);

pub struct HousekeepingCancelledOnShutdown;

#[async_trait]
impl Scenario for HousekeepingCancelledOnShutdown {
    fn id(&self) -> &'static str {
        "housekeeping.cancelled_on_shutdown"
    }

    fn suite(&self) -> &'static str {
        "housekeeping"
    }

    async fn execute(&self) -> storage_testing::errors::Result<()> {
        let bench = TestDaemon::builder()
            .modules(&["probe"])
            .present(vec![fixtures::probed("vd0", "slow")])
            .housekeeping_interval_secs(1)
            .build()?;
        assert!(bench.object(&group_path("slow")).is_some());
        let probe = bench.fakes.probe.clone();
        let running = bench.spawn();

        let wait = Duration::from_secs(3);
        tokio::time::timeout(wait, probe.housekeeping_started())
            .await
            .map_err(|_| TestingError::Timeout {
                what: "first housekeeping run".to_string(),
                timeout: wait,
            })?;
        tokio::time::sleep(SHUTDOWN_AFTER).await;

        let started = Instant::now();
        running.shutdown().await;
        let took = started.elapsed();
        assert!(took < SHUTDOWN_BUDGET, "shutdown took {took:?}");
        assert!(probe.housekeeping_cancelled.load(Ordering::SeqCst));
        assert!(probe.torn_down.load(Ordering::SeqCst));

        // Nothing is scheduled once the daemon is down
        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert_eq!(probe.housekeeping_runs(), 1);
        Ok(())
    }
}
