// SPDX-License-Identifier: GPL-3.0-only

use async_trait::async_trait;
use storage_contracts::AuthorizationResult;
use storage_service::ServiceError;
use storage_service::auth::actions;
use storage_service::modules::btrfs::BtrfsManager;
use storage_testing::harness::user_caller;
use storage_testing::{TestDaemon, fixtures};
use storage_types::{ObjectPath, OptionBag, Uevent};

use crate::Scenario;

pub struct BtrfsCreateVolumeDenied;

#[async_trait]
impl Scenario for BtrfsCreateVolumeDenied {
    fn id(&self) -> &'static str {
        "btrfs.create_volume.denied"
    }

    fn suite(&self) -> &'static str {
        "btrfs"
    }

    async fn execute(&self) -> storage_testing::errors::Result<()> {
        let mut bench = TestDaemon::with_modules(&["btrfs"])?;
        bench.emit(Uevent::add(fixtures::block("sdc", "")));
        bench
            .fakes
            .authority
            .set_verdict(AuthorizationResult::Challenge);

        let manager = BtrfsManager::new(bench.daemon_handle());
        let result = manager
            .create_volume(
                &user_caller(),
                &[ObjectPath::for_block_device("/dev/sdc")],
                "pool",
                "",
                "",
                &OptionBag::new(),
            )
            .await;

        assert!(matches!(
            result,
            Err(ServiceError::NotAuthorized {
                could_obtain: true,
                ..
            })
        ));
        let checks = bench.fakes.authority.checks();
        assert_eq!(checks.len(), 1);
        assert_eq!(checks[0].uid, 1000);
        assert_eq!(checks[0].action_id, actions::MANAGE_BTRFS);
        assert!(checks[0].allow_user_interaction);
        assert!(bench.fakes.blocklib.calls().is_empty());
        Ok(())
    }
}
