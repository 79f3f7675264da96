//! Timer-driven sync scheduling.
//!
//! A single control loop owns two resettable timers, one for users and one
//! for items. Both fire immediately at startup and are re-armed after their
//! cycle finishes, so a cycle never overlaps with itself. Failed cycles are
//! logged and wait for their next fire; there is no retry.

use crate::services::reconciler::{total_written, Reconciler};
use log::{error, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;

/// Default user resync interval (6 hours).
pub const DEFAULT_USER_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);

/// Default item resync interval (5 minutes).
pub const DEFAULT_ITEM_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Scheduler intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub user_interval: Duration,
    pub item_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            user_interval: DEFAULT_USER_INTERVAL,
            item_interval: DEFAULT_ITEM_INTERVAL,
        }
    }
}

/// Handle to a scheduler running in the background.
pub struct SchedulerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop the loop and wait for the current cycle to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            error!("[sync] Scheduler task failed: {}", e);
        }
    }

    /// Wait for the loop to exit on its own (after cancellation).
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            error!("[sync] Scheduler task failed: {}", e);
        }
    }
}

/// Drives user and item sync cycles.
pub struct Scheduler {
    reconciler: Arc<Reconciler>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(reconciler: Arc<Reconciler>, config: SchedulerConfig) -> Self {
        Self { reconciler, config }
    }

    /// Spawn the control loop. It exits once `cancel` is tripped.
    pub fn start_background(self, cancel: CancellationToken) -> SchedulerHandle {
        let loop_cancel = cancel.clone();
        let task = tokio::spawn(async move { self.run(loop_cancel).await });
        SchedulerHandle { cancel, task }
    }

    /// Run the control loop until `cancel` is tripped.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            "[sync] Scheduler started: users every {}, items every {}",
            humantime::format_duration(self.config.user_interval),
            humantime::format_duration(self.config.item_interval)
        );

        let user_timer = time::sleep(Duration::ZERO);
        let item_timer = time::sleep(Duration::ZERO);
        tokio::pin!(user_timer, item_timer);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!("[sync] Scheduler stopping");
                    break;
                }
                _ = &mut user_timer => {
                    self.run_user_cycle().await;
                    user_timer.as_mut().reset(time::Instant::now() + self.config.user_interval);
                }
                _ = &mut item_timer => {
                    self.run_item_cycle().await;
                    item_timer.as_mut().reset(time::Instant::now() + self.config.item_interval);
                }
            }
        }

        info!("[sync] Scheduler stopped");
    }

    /// Run one user sync cycle. Returns the number of users written.
    pub async fn run_user_cycle(&self) -> Option<usize> {
        let start = Instant::now();
        info!("[sync] Syncing users...");

        match self.reconciler.sync_users().await {
            Ok(written) => {
                info!(
                    "[sync] User sync complete: {} written in {}ms",
                    written,
                    start.elapsed().as_millis()
                );
                Some(written)
            }
            Err(e) => {
                error!("[sync] User sync failed: {}", e);
                None
            }
        }
    }

    /// Run one item sync cycle, group by group. Returns the total written.
    pub async fn run_item_cycle(&self) -> usize {
        let start = Instant::now();
        let groups = self.reconciler.groups();
        info!("[sync] Syncing items of {} group(s)...", groups.len());

        let mut results = Vec::with_capacity(groups.len());
        let mut failed_groups = 0;
        for group in groups.iter() {
            match self.reconciler.sync_group_items(group).await {
                Ok(result) => {
                    if let Some(e) = result.combined_error() {
                        failed_groups += 1;
                        warn!("[sync] Items of {} may be stale: {}", group.full_path, e);
                    }
                    results.push(result);
                }
                Err(e) => {
                    failed_groups += 1;
                    error!("[sync] Item sync of {} failed: {}", group.full_path, e);
                }
            }
        }

        let total = total_written(&results);
        info!(
            "[sync] Item sync complete: {} written, {} group(s) with errors, {}ms",
            total,
            failed_groups,
            start.elapsed().as_millis()
        );
        total
    }
}
