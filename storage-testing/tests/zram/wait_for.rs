// SPDX-License-Identifier: GPL-3.0-only

use std::time::Duration;

use async_trait::async_trait;
use storage_service::modules::zram::ZramManager;
use storage_service::{ServiceError, WireError};
use storage_testing::TestDaemon;
use storage_testing::harness::root_caller;
use storage_types::{ObjectPath, OptionBag};

use crate::Scenario;

const SIZE: u64 = 64 << 20;
const DEVICE_DELAY: Duration = Duration::from_millis(500);

pub struct ZramWaitForObjects;

#[async_trait]
impl Scenario for ZramWaitForObjects {
    fn id(&self) -> &'static str {
        "zram.wait_for.objects"
    }

    fn suite(&self) -> &'static str {
        "zram"
    }

    async fn execute(&self) -> storage_testing::errors::Result<()> {
        let bench = TestDaemon::with_modules(&["zram"])?;
        bench.fakes.blocklib.set_device_delay(DEVICE_DELAY);
        let running = bench.spawn();

        let manager =
            ZramManager::new(running.daemon_handle()).with_wait_timeout(Duration::from_secs(2));
        let paths = manager
            .create_devices(&root_caller(), &[SIZE, SIZE], &[1, 1], &OptionBag::new())
            .await?;

        assert_eq!(
            paths,
            vec![
                ObjectPath::for_block_device("/dev/zram0"),
                ObjectPath::for_block_device("/dev/zram1"),
            ]
        );
        for path in &paths {
            assert!(running.objects().contains(path));
        }
        assert_eq!(
            running.fakes.blocklib.calls(),
            vec![format!("zram create [{SIZE}, {SIZE}] streams=[1, 1]")]
        );

        let fakes = running.shutdown().await;
        let modprobe = std::fs::read_to_string(fakes.state_dir.path().join("modprobe.d/zram.conf"))?;
        assert_eq!(modprobe, "options zram num_devices=2\n");
        Ok(())
    }
}

pub struct ZramWaitForTimesOut;

#[async_trait]
impl Scenario for ZramWaitForTimesOut {
    fn id(&self) -> &'static str {
        "zram.wait_for.times_out"
    }

    fn suite(&self) -> &'static str {
        "zram"
    }

    async fn execute(&self) -> storage_testing::errors::Result<()> {
        let bench = TestDaemon::with_modules(&["zram"])?;
        bench.fakes.blocklib.set_device_delay(DEVICE_DELAY);
        let running = bench.spawn();

        let manager = ZramManager::new(running.daemon_handle())
            .with_wait_timeout(Duration::from_millis(100));
        let err = manager
            .create_devices(&root_caller(), &[SIZE, SIZE], &[1, 1], &OptionBag::new())
            .await
            .expect_err("devices show up after the timeout");

        assert!(matches!(err, ServiceError::Timeout(_)));
        match WireError::from(err) {
            WireError::Failed(message) => assert_eq!(
                message,
                "Error waiting for ZRAM objects after creating: timed out"
            ),
            other => panic!("expected Failed, got {other:?}"),
        }

        // The devices still arrive; the daemon picks them up regardless
        running
            .exported(&ObjectPath::for_block_device("/dev/zram1"), Duration::from_secs(2))
            .await?;
        running.shutdown().await;
        Ok(())
    }
}
