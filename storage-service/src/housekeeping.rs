// SPDX-License-Identifier: GPL-3.0-only

//! Periodic housekeeping of module objects
//!
//! Ticks fire every interval measured from the start of the previous run.
//! Each target runs on the blocking pool; a tick waits for all of them.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use storage_types::ObjectPath;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::dispatcher::DispatchItem;
use crate::module::Housekeeping;

/// Module objects that opted into housekeeping, shared with the claim registry
#[derive(Clone, Default)]
pub struct HousekeepingTargets {
    targets: Arc<Mutex<BTreeMap<ObjectPath, Arc<dyn Housekeeping>>>>,
}

impl HousekeepingTargets {
    pub fn insert(&self, path: ObjectPath, target: Arc<dyn Housekeeping>) {
        self.lock().insert(path, target);
    }

    pub fn remove(&self, path: &ObjectPath) {
        self.lock().remove(path);
    }

    pub fn paths(&self) -> Vec<ObjectPath> {
        self.lock().keys().cloned().collect()
    }

    fn snapshot(&self) -> Vec<(ObjectPath, Arc<dyn Housekeeping>)> {
        self.lock()
            .iter()
            .map(|(path, target)| (path.clone(), target.clone()))
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<ObjectPath, Arc<dyn Housekeeping>>> {
        self.targets.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pub struct HousekeepingScheduler {
    targets: HousekeepingTargets,
    interval: Duration,
    dispatch: mpsc::UnboundedSender<DispatchItem>,
}

impl HousekeepingScheduler {
    pub fn new(
        targets: HousekeepingTargets,
        interval: Duration,
        dispatch: mpsc::UnboundedSender<DispatchItem>,
    ) -> Self {
        Self {
            targets,
            interval,
            dispatch,
        }
    }

    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(
            "Housekeeping every {} seconds",
            self.interval.as_secs_f64()
        );
        let mut last = Instant::now();
        let mut next = last + self.interval;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep_until(next) => {}
            }

            let started = Instant::now();
            let secs_since_last = started.duration_since(last).as_secs();
            self.tick(secs_since_last, &cancel).await;
            last = started;
            // A tick longer than the interval makes the next one due at once
            next = started + self.interval;
        }

        tracing::debug!("Housekeeping stopped");
    }

    /// Run every target once; returns how many ran
    pub async fn tick(&self, secs_since_last: u64, cancel: &CancellationToken) -> usize {
        let targets = self.targets.snapshot();
        if targets.is_empty() {
            return 0;
        }
        tracing::debug!("Housekeeping {} objects", targets.len());

        let mut workers = JoinSet::new();
        for (path, target) in targets {
            let cancel = cancel.clone();
            workers.spawn_blocking(move || {
                let result = target.housekeeping(secs_since_last, &cancel);
                (path, result)
            });
        }

        let mut ran = 0;
        while let Some(joined) = workers.join_next().await {
            ran += 1;
            match joined {
                Ok((path, Ok(()))) => {
                    let _ = self.dispatch.send(DispatchItem::Resync(path));
                }
                Ok((path, Err(e))) => {
                    tracing::warn!("Housekeeping of {path} failed: {e}");
                    let _ = self.dispatch.send(DispatchItem::Resync(path));
                }
                Err(e) => tracing::error!("Housekeeping worker panicked: {e}"),
            }
        }
        ran
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::*;
    use crate::error::{Result, ServiceError};

    struct Counting {
        calls: AtomicU64,
        last_secs: AtomicU64,
        fail: bool,
    }

    impl Housekeeping for Counting {
        fn housekeeping(&self, secs_since_last: u64, _cancel: &CancellationToken) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.last_secs.store(secs_since_last, Ordering::SeqCst);
            if self.fail {
                return Err(ServiceError::InvalidArgument("stale".to_string()));
            }
            Ok(())
        }
    }

    fn counting(fail: bool) -> Arc<Counting> {
        Arc::new(Counting {
            calls: AtomicU64::new(0),
            last_secs: AtomicU64::new(0),
            fail,
        })
    }

    #[tokio::test]
    async fn failures_do_not_abort_the_tick() {
        let targets = HousekeepingTargets::default();
        let good = counting(false);
        let bad = counting(true);
        targets.insert(ObjectPath::root().child("good"), good.clone());
        targets.insert(ObjectPath::root().child("bad"), bad.clone());

        let (tx, mut rx) = mpsc::unbounded_channel();
        let scheduler = HousekeepingScheduler::new(targets, Duration::from_secs(600), tx);
        let ran = scheduler.tick(42, &CancellationToken::new()).await;

        assert_eq!(ran, 2);
        assert_eq!(good.calls.load(Ordering::SeqCst), 1);
        assert_eq!(bad.calls.load(Ordering::SeqCst), 1);
        assert_eq!(good.last_secs.load(Ordering::SeqCst), 42);

        let mut resynced = Vec::new();
        while let Ok(DispatchItem::Resync(path)) = rx.try_recv() {
            resynced.push(path);
        }
        assert_eq!(resynced.len(), 2);
    }

    #[tokio::test]
    async fn first_tick_waits_one_interval() {
        let targets = HousekeepingTargets::default();
        let target = counting(false);
        targets.insert(ObjectPath::root().child("pool"), target.clone());

        let (tx, _rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let scheduler = HousekeepingScheduler::new(targets, Duration::from_millis(300), tx);
        let handle = tokio::spawn(scheduler.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(target.calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(target.calls.load(Ordering::SeqCst), 1);

        cancel.cancel();
        handle.await.expect("scheduler stops");
    }
}
