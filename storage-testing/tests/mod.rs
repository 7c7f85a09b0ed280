// SPDX-License-Identifier: GPL-3.0-only

use std::sync::Arc;

use async_trait::async_trait;

use storage_testing::errors::Result;

pub mod btrfs;
pub mod claims;
pub mod housekeeping;
pub mod invariants;
pub mod zram;

#[async_trait]
pub trait Scenario: Send + Sync {
    fn id(&self) -> &'static str;
    fn suite(&self) -> &'static str;
    async fn execute(&self) -> Result<()>;
}

pub type ScenarioRef = Arc<dyn Scenario>;

pub fn instantiate_scenarios() -> Vec<ScenarioRef> {
    vec![
        Arc::new(btrfs::appear_disappear::BtrfsAppearDisappear),
        Arc::new(btrfs::presence_flip::BtrfsPresenceFlip),
        Arc::new(btrfs::create_volume::BtrfsCreateVolumeDenied),
        Arc::new(claims::loop_pool::ClaimsLoopPoolAbsorbs),
        Arc::new(claims::release::ClaimsReleaseWithoutFactory),
        Arc::new(claims::retained::ClaimsKeptOwnerDropsRemoved),
        Arc::new(claims::volume_group::ClaimsVolumeGroupMembers),
        Arc::new(zram::wait_for::ZramWaitForObjects),
        Arc::new(zram::wait_for::ZramWaitForTimesOut),
        Arc::new(housekeeping::cancellation::HousekeepingCancelledOnShutdown),
        Arc::new(invariants::idempotence::InvariantsRepeatedChangeIsSilent),
        Arc::new(invariants::idempotence::InvariantsStrayRemoveIsIgnored),
        Arc::new(invariants::idempotence::InvariantsReaddKeepsPath),
        Arc::new(invariants::modules::InvariantsFailedInitIsAbsent),
        Arc::new(invariants::modules::InvariantsRescanAfterLateLoad),
    ]
}

async fn run_suite(suite: &str) {
    let scenarios: Vec<ScenarioRef> = instantiate_scenarios()
        .into_iter()
        .filter(|scenario| scenario.suite() == suite)
        .collect();
    assert!(!scenarios.is_empty(), "suite {suite} has no scenarios");

    for scenario in scenarios {
        if let Err(e) = scenario.execute().await {
            panic!("{} failed: {e}", scenario.id());
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn btrfs_suite() {
    run_suite("btrfs").await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn claims_suite() {
    run_suite("claims").await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn zram_suite() {
    run_suite("zram").await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn housekeeping_suite() {
    run_suite("housekeeping").await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn invariants_suite() {
    run_suite("invariants").await;
}
