//! The local progress cache.
//!
//! A process-wide mirror of the last known record per learner. It is never
//! authoritative: a fetch replaces it, except that completions and pointer
//! moves not yet written to the store are merged back in rather than lost.

use core_types::{LearnerId, ProgressRecord};
use std::collections::HashMap;
use tokio::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub record: ProgressRecord,
    /// Bumped on every fetch. Writes started under an older epoch are discarded.
    pub epoch: u64,
    /// Local state exists that the store has not acknowledged.
    pub unsynced: bool,
    fetched_at: Instant,
    last_seen: Instant,
}

#[derive(Debug)]
pub struct ProgressCache {
    entries: HashMap<LearnerId, CacheEntry>,
    ttl: Duration,
    /// Synced entries untouched for this long are dropped.
    idle: Duration,
    last_sweep: Instant,
    next_epoch: u64,
}

impl ProgressCache {
    pub fn new(ttl: Duration, idle: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            idle,
            last_sweep: Instant::now(),
            next_epoch: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, learner: LearnerId) -> Option<&CacheEntry> {
        self.entries.get(&learner)
    }

    /// The cached record, if it is younger than the TTL.
    pub fn fresh(&self, learner: LearnerId) -> Option<ProgressRecord> {
        self.entries
            .get(&learner)
            .filter(|e| e.fetched_at.elapsed() < self.ttl)
            .map(|e| e.record.clone())
    }

    /// Applies a record read from the store and starts a new epoch.
    ///
    /// Unsynced local state is merged into the remote record by union.
    pub fn apply_fetch(&mut self, learner: LearnerId, remote: ProgressRecord) -> ProgressRecord {
        let epoch = self.next_epoch;
        self.next_epoch += 1;

        let (record, unsynced) = match self.entries.get(&learner) {
            Some(local) if local.unsynced => {
                let merged = local.record.merged_with(&remote);
                let still_ahead = merged.is_ahead_of(&remote);
                (merged, still_ahead)
            }
            _ => (remote, false),
        };

        self.entries.insert(
            learner,
            CacheEntry {
                record: record.clone(),
                epoch,
                unsynced,
                fetched_at: Instant::now(),
                last_seen: Instant::now(),
            },
        );
        record
    }

    /// Applies a local mutation and flags it unsynced.
    ///
    /// Returns the epoch the matching write must be checked against and the
    /// record to send, which includes any earlier unsynced state.
    pub fn apply_local(&mut self, learner: LearnerId, record: ProgressRecord) -> (u64, ProgressRecord) {
        match self.entries.get_mut(&learner) {
            Some(entry) => {
                entry.record = entry.record.merged_with(&record);
                entry.unsynced = true;
                entry.last_seen = Instant::now();
                (entry.epoch, entry.record.clone())
            }
            None => {
                let epoch = self.next_epoch;
                self.next_epoch += 1;
                self.entries.insert(
                    learner,
                    CacheEntry {
                        record: record.clone(),
                        epoch,
                        unsynced: true,
                        fetched_at: Instant::now(),
                        last_seen: Instant::now(),
                    },
                );
                (epoch, record)
            }
        }
    }

    /// Applies the store's answer to a write started at `epoch`.
    ///
    /// Returns whether the entry is now in sync. A write whose epoch has been
    /// superseded by a newer fetch is ignored.
    pub fn apply_persisted(&mut self, learner: LearnerId, epoch: u64, stored: &ProgressRecord) -> bool {
        let Some(entry) = self.entries.get_mut(&learner) else {
            return false;
        };
        if entry.epoch != epoch {
            tracing::debug!(%learner, epoch, current = entry.epoch, "Discarding write result from a superseded epoch.");
            return false;
        }
        entry.record = entry.record.merged_with(stored);
        entry.unsynced = entry.record.is_ahead_of(stored);
        entry.last_seen = Instant::now();
        !entry.unsynced
    }

    /// Replaces the entry with the store's copy after the store rejected a write.
    ///
    /// Local state is dropped, so the entry is no longer pending.
    pub fn replace(&mut self, learner: LearnerId, remote: ProgressRecord) {
        let epoch = self.next_epoch;
        self.next_epoch += 1;
        self.entries.insert(
            learner,
            CacheEntry {
                record: remote,
                epoch,
                unsynced: false,
                fetched_at: Instant::now(),
                last_seen: Instant::now(),
            },
        );
    }

    /// Drops the learner's entry, pending or not.
    pub fn remove(&mut self, learner: LearnerId) {
        self.entries.remove(&learner);
    }

    /// Whether a sweep is due. Sweeps run at most once per TTL.
    pub fn sweep_due(&self) -> bool {
        self.last_sweep.elapsed() >= self.ttl
    }

    /// Drops synced entries idle for longer than the idle window and returns
    /// their learners. Unsynced entries are kept until the store has them.
    pub fn evict_idle(&mut self) -> Vec<LearnerId> {
        self.last_sweep = Instant::now();
        let idle = self.idle;
        let evicted: Vec<LearnerId> = self
            .entries
            .iter()
            .filter(|(_, e)| !e.unsynced && e.last_seen.elapsed() >= idle)
            .map(|(learner, _)| *learner)
            .collect();
        for learner in &evicted {
            self.entries.remove(learner);
        }
        evicted
    }

    /// Learners with state the store has not acknowledged.
    pub fn pending(&self) -> Vec<(LearnerId, ProgressRecord, u64)> {
        self.entries
            .iter()
            .filter(|(_, e)| e.unsynced)
            .map(|(learner, e)| (*learner, e.record.clone(), e.epoch))
            .collect()
    }

    pub fn is_unsynced(&self, learner: LearnerId) -> bool {
        self.entries.get(&learner).is_some_and(|e| e.unsynced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::LessonId;

    fn learner() -> LearnerId {
        LearnerId::from_u128(7)
    }

    #[test]
    fn fetch_replaces_synced_state() {
        let mut cache = ProgressCache::new(Duration::from_secs(60), Duration::from_secs(600));
        cache.apply_fetch(learner(), ProgressRecord::new(0, 2, [LessonId(1)]));
        let record = cache.apply_fetch(learner(), ProgressRecord::new(0, 3, [LessonId(1), LessonId(2)]));
        assert_eq!(record, ProgressRecord::new(0, 3, [LessonId(1), LessonId(2)]));
        assert!(!cache.is_unsynced(learner()));
    }

    #[test]
    fn stale_fetch_is_merged_with_unsynced_completions() {
        let mut cache = ProgressCache::new(Duration::from_secs(60), Duration::from_secs(600));
        cache.apply_fetch(learner(), ProgressRecord::new(0, 3, [LessonId(1), LessonId(2)]));
        cache.apply_local(learner(), ProgressRecord::new(0, 3, [LessonId(1), LessonId(2), LessonId(3)]));

        let record = cache.apply_fetch(learner(), ProgressRecord::new(0, 3, [LessonId(1), LessonId(2)]));
        assert!(record.is_completed(LessonId(3)));
        assert!(cache.is_unsynced(learner()));
    }

    #[test]
    fn superseded_write_is_discarded() {
        let mut cache = ProgressCache::new(Duration::from_secs(60), Duration::from_secs(600));
        cache.apply_fetch(learner(), ProgressRecord::new_learner());
        let (epoch, _) = cache.apply_local(learner(), ProgressRecord::new(0, 1, [LessonId(1)]));
        cache.apply_fetch(learner(), ProgressRecord::new_learner());

        assert!(!cache.apply_persisted(learner(), epoch, &ProgressRecord::new(0, 1, [LessonId(1)])));
        assert_eq!(cache.pending().len(), 1);
    }

    #[test]
    fn acknowledged_write_clears_the_flag() {
        let mut cache = ProgressCache::new(Duration::from_secs(60), Duration::from_secs(600));
        cache.apply_fetch(learner(), ProgressRecord::new_learner());
        let stored = ProgressRecord::new(0, 1, [LessonId(1)]);
        let (epoch, sent) = cache.apply_local(learner(), stored.clone());
        assert_eq!(sent, stored);
        assert!(cache.apply_persisted(learner(), epoch, &stored));
        assert!(cache.pending().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn entries_go_stale_after_the_ttl() {
        let mut cache = ProgressCache::new(Duration::from_secs(60), Duration::from_secs(600));
        cache.apply_fetch(learner(), ProgressRecord::new_learner());
        assert!(cache.fresh(learner()).is_some());
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(cache.fresh(learner()).is_none());
        assert!(cache.get(learner()).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_synced_entries_are_evicted() {
        let mut cache = ProgressCache::new(Duration::from_secs(60), Duration::from_secs(600));
        let idle = LearnerId::from_u128(1);
        let pending = LearnerId::from_u128(2);
        cache.apply_fetch(idle, ProgressRecord::new_learner());
        cache.apply_local(pending, ProgressRecord::new(0, 1, [LessonId(1)]));

        tokio::time::advance(Duration::from_secs(300)).await;
        assert!(cache.sweep_due());
        assert!(cache.evict_idle().is_empty());
        assert!(!cache.sweep_due());

        tokio::time::advance(Duration::from_secs(301)).await;
        assert_eq!(cache.evict_idle(), vec![idle]);
        assert!(cache.get(idle).is_none());
        assert!(cache.is_unsynced(pending));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn replace_drops_pending_state() {
        let mut cache = ProgressCache::new(Duration::from_secs(60), Duration::from_secs(600));
        let (epoch, _) = cache.apply_local(learner(), ProgressRecord::new(0, 2, [LessonId(1)]));
        cache.replace(learner(), ProgressRecord::new_learner());
        assert!(cache.pending().is_empty());
        assert_ne!(cache.get(learner()).map(|e| e.epoch), Some(epoch));
    }
}
