use crate::ProgressService;
use std::sync::Arc;
use tokio::time::{Duration, MissedTickBehavior, interval};

/// Background flusher for progress the store has not acknowledged.
///
/// Runs in its own task next to the web server. On every tick it re-sends the
/// cached record of every learner flagged unsynced; failures keep the flag so
/// the next tick tries again. Idle learners are swept from the cache here too.
pub struct SyncRetrier {
    service: Arc<ProgressService>,
    every: Duration,
}

impl SyncRetrier {
    pub fn new(service: Arc<ProgressService>, every: Duration) -> Self {
        Self { service, every }
    }

    /// One pass over the pending learners. Returns how many are now in sync.
    pub async fn run_once(&self) -> usize {
        self.service.evict_idle(false).await;
        let synced = self.service.retry_all_pending().await;
        if synced > 0 {
            tracing::info!(synced, "Flushed pending progress to the store.");
        }
        synced
    }

    pub async fn start(self) {
        tracing::info!(every = ?self.every, "Starting background progress sync.");
        let mut timer = interval(self.every);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            // The first tick completes immediately.
            timer.tick().await;
            self.run_once().await;
        }
    }
}
