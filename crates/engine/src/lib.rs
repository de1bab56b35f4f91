//! # Progression Engine
//!
//! The lesson progression and unlock state machine. The pure pieces (unlock
//! evaluation, the navigation guard, completion recording and the level
//! transition) live in their own modules; `ProgressService` owns the local
//! cache and drives them against a `ProgressStore` and a `CurriculumSource`.

use crate::error::EngineError;
use crate::guard::{Readiness, RouteDecision};
use crate::view::{
    AdvanceOutcome, GateOutcome, LearningPath, PathLesson, PathLevel, RouteOutcome, RouteView,
};
use api_client::{CurriculumSource, ProgressStore};
use cache::ProgressCache;
use configuration::Config;
use core_types::{
    Curriculum, CurriculumLevel, GateResult, LearnerId, Lesson, LevelUpEvent, ProgressRecord, RouteTarget,
};
use events::ProgressEvent;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell, broadcast};
use tokio::time::Duration;
use transition::TransitionGuard;

pub mod cache;
pub mod error;
pub mod guard;
pub mod reconciler;
pub mod recorder;
pub mod transition;
pub mod unlock;
pub mod view;

#[cfg(test)]
mod fixtures;

pub use reconciler::SyncRetrier;

const EVENT_CAPACITY: usize = 256;

/// Tunables of the service, normally taken from the application config.
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub cache_ttl: Duration,
    pub cache_idle: Duration,
    pub max_levels: u32,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(300),
            cache_idle: Duration::from_secs(1800),
            max_levels: 10,
        }
    }
}

impl ServiceOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            cache_ttl: config.cache.ttl(),
            cache_idle: config.cache.idle(),
            max_levels: config.curriculum.max_levels,
        }
    }
}

/// Per-learner state that belongs to the current page visit, not to the record.
#[derive(Debug, Default)]
struct VisitState {
    transition: TransitionGuard,
    pending_level_up: Option<LevelUpEvent>,
}

/// The injectable progress service.
///
/// Owns the local progress cache and the per-visit level-up guards, loads the
/// curriculum once, and exposes the operations the presentation layer calls.
pub struct ProgressService {
    store: Arc<dyn ProgressStore>,
    lessons: Arc<dyn CurriculumSource>,
    cache: Arc<Mutex<ProgressCache>>,
    curriculum: OnceCell<Arc<Curriculum>>,
    // Lock order: `visits` before `cache`.
    visits: Mutex<HashMap<LearnerId, VisitState>>,
    events: broadcast::Sender<ProgressEvent>,
    max_levels: u32,
}

impl ProgressService {
    pub fn new(
        store: Arc<dyn ProgressStore>,
        lessons: Arc<dyn CurriculumSource>,
        options: ServiceOptions,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store,
            lessons,
            cache: Arc::new(Mutex::new(ProgressCache::new(options.cache_ttl, options.cache_idle))),
            curriculum: OnceCell::new(),
            visits: Mutex::new(HashMap::new()),
            events,
            max_levels: options.max_levels,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.events.subscribe()
    }

    // ==========================================================================
    // Loading
    // ==========================================================================

    /// The curriculum, fetched level by level on first use and kept for the
    /// lifetime of the service.
    pub async fn curriculum(&self) -> Result<Arc<Curriculum>, EngineError> {
        self.curriculum
            .get_or_try_init(|| self.load_curriculum())
            .await
            .map(Arc::clone)
    }

    async fn load_curriculum(&self) -> Result<Arc<Curriculum>, EngineError> {
        let mut lessons = Vec::new();
        for level in 0..self.max_levels {
            let batch = self.lessons.get_lessons_for_level(level).await?;
            if batch.is_empty() {
                break;
            }
            lessons.extend(batch);
        }
        if lessons.is_empty() {
            return Err(EngineError::NotFound("the curriculum has no lessons".to_string()));
        }

        let curriculum = Curriculum::from_lessons(lessons)?;
        tracing::info!(
            levels = curriculum.levels().len(),
            lessons = curriculum.len(),
            "Loaded curriculum."
        );
        Ok(Arc::new(curriculum))
    }

    /// The learner's progress, from the cache while it is fresh.
    pub async fn load_progress(&self, learner: LearnerId) -> Result<ProgressRecord, EngineError> {
        let cached = self.cache.lock().await.fresh(learner);
        match cached {
            Some(record) => Ok(record),
            None => self.refresh_progress(learner).await,
        }
    }

    /// Re-reads the learner's progress from the store.
    ///
    /// A learner without a record gets the default one. If the store cannot be
    /// reached the cached copy is served when there is one.
    pub async fn refresh_progress(&self, learner: LearnerId) -> Result<ProgressRecord, EngineError> {
        let fetched = match self.store.get_progress(learner).await {
            Ok(Some(record)) => Ok(record),
            Ok(None) => {
                tracing::info!(%learner, "No progress on record; creating the default.");
                self.store.create_default_progress(learner).await
            }
            Err(e) => Err(e),
        };

        match fetched {
            Ok(remote) => Ok(self.cache.lock().await.apply_fetch(learner, remote)),
            Err(e) if e.is_transient() => {
                let cache = self.cache.lock().await;
                match cache.get(learner) {
                    Some(entry) => {
                        tracing::warn!(%learner, error = %e, "Progress store unreachable; serving cached progress.");
                        Ok(entry.record.clone())
                    }
                    None => Err(EngineError::TransientIo(e)),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// The cached record and whether it has unacknowledged local changes.
    pub async fn cached_progress(&self, learner: LearnerId) -> Option<(ProgressRecord, bool)> {
        self.cache
            .lock()
            .await
            .get(learner)
            .map(|e| (e.record.clone(), e.unsynced))
    }

    // ==========================================================================
    // Presentation boundary
    // ==========================================================================

    /// Decides whether `requested` is rendered or redirected for this learner.
    pub async fn evaluate_route(
        &self,
        learner: LearnerId,
        requested: RouteTarget,
    ) -> Result<RouteOutcome, EngineError> {
        self.evict_idle(false).await;
        self.retry_pending(learner).await;

        let curriculum = self.curriculum().await?;
        let progress = self.load_progress(learner).await?;

        let decision = Readiness::default()
            .with_curriculum(&curriculum)
            .with_progress(&progress)
            .authorize(requested)
            .ok_or_else(|| EngineError::InconsistentState("route evaluated before its inputs resolved".to_string()))?;

        match decision {
            RouteDecision::Redirect(to) => {
                tracing::debug!(%learner, from = %requested, %to, "Redirecting lesson route.");
                self.emit(ProgressEvent::Redirected {
                    learner,
                    from: requested,
                    to,
                });
                Ok(RouteOutcome::Redirect { to })
            }
            RouteDecision::Allow => {
                let lesson = curriculum
                    .lesson_at(requested.level, requested.lesson)
                    .cloned()
                    .ok_or_else(|| EngineError::InconsistentState(format!("allowed route {} has no lesson", requested)))?;

                let pending_level_up = {
                    let mut visits = self.visits.lock().await;
                    let visit = visits.entry(learner).or_default();
                    visit.transition.observe(requested);
                    visit.pending_level_up.clone()
                };
                let sync_warning = self.cache.lock().await.is_unsynced(learner);

                Ok(RouteOutcome::Render(Box::new(route_view(
                    &curriculum,
                    lesson,
                    &progress,
                    sync_warning,
                    pending_level_up,
                ))))
            }
        }
    }

    /// Records a gate result and runs the level transition when the lesson
    /// closes the learner's current level.
    ///
    /// Failed results and replays change nothing.
    pub async fn on_gate_completed(
        &self,
        learner: LearnerId,
        result: GateResult,
    ) -> Result<GateOutcome, EngineError> {
        let curriculum = self.curriculum().await?;
        let lesson = curriculum
            .lesson(result.lesson_id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("lesson {}", result.lesson_id)))?;
        let progress = self.load_progress(learner).await?;

        if !result.passed {
            tracing::debug!(%learner, lesson_id = %lesson.id, "Gate not passed; nothing recorded.");
            let unsynced = self.cache.lock().await.is_unsynced(learner);
            return Ok(GateOutcome {
                record: progress,
                newly_completed: false,
                level_up: None,
                synced: !unsynced,
            });
        }

        let (completion, write) = {
            let mut cache = self.cache.lock().await;
            let current = cache.get(learner).map_or(progress, |e| e.record.clone());
            let completion = recorder::record_completion(&current, lesson.id);
            let write = completion
                .newly_recorded
                .then(|| cache.apply_local(learner, completion.record.clone()));
            (completion, write)
        };

        let mut synced = match write {
            Some((epoch, record)) => {
                tracing::info!(%learner, lesson_id = %lesson.id, "Recorded lesson completion.");
                self.emit(ProgressEvent::CompletionRecorded {
                    learner,
                    lesson_id: lesson.id,
                });
                self.persist(learner, epoch, record).await
            }
            None => {
                tracing::debug!(%learner, lesson_id = %lesson.id, "Completion already recorded.");
                !self.cache.lock().await.is_unsynced(learner)
            }
        };

        let level_up = match self.try_level_up(learner, &curriculum, &lesson).await {
            Some((event, level_synced)) => {
                synced = level_synced;
                Some(event)
            }
            None => None,
        };

        if !synced {
            let message = match &level_up {
                Some(_) => "Level completed, but progress has not reached the store yet. It will be retried.",
                None => "Completion saved locally; the progress store could not be reached. It will be retried.",
            };
            self.emit(ProgressEvent::sync_warning(learner, message));
        }

        let record = self
            .cached_progress(learner)
            .await
            .map_or(completion.record, |(record, _)| record);
        Ok(GateOutcome {
            record,
            newly_completed: completion.newly_recorded,
            level_up,
            synced,
        })
    }

    /// The "next" control: moves past `current`, or levels up from the last
    /// lesson of the level.
    pub async fn advance(&self, learner: LearnerId, current: RouteTarget) -> Result<AdvanceOutcome, EngineError> {
        let curriculum = self.curriculum().await?;
        let progress = self.load_progress(learner).await?;

        if let RouteDecision::Redirect(to) = guard::authorize(current, &progress, &curriculum) {
            return Ok(AdvanceOutcome::Redirect { to });
        }
        let lesson = curriculum
            .lesson_at(current.level, current.lesson)
            .cloned()
            .ok_or_else(|| EngineError::InconsistentState(format!("allowed route {} has no lesson", current)))?;

        if lesson.requires_completion_gate && !progress.is_completed(lesson.id) {
            return Ok(AdvanceOutcome::Blocked { lesson_id: lesson.id });
        }

        if !curriculum.is_last_in_level(&lesson) {
            let to = RouteTarget::new(lesson.level, lesson.page_number + 1);
            let write = {
                let mut cache = self.cache.lock().await;
                let latest = cache.get(learner).map_or(progress, |e| e.record.clone());
                // Re-walking visited lessons never moves the pointer back.
                (to > latest.pointer()).then(|| {
                    let moved = ProgressRecord {
                        level: to.level,
                        lesson: to.lesson,
                        completed_lesson_ids: latest.completed_lesson_ids.clone(),
                    };
                    cache.apply_local(learner, moved)
                })
            };
            if let Some((epoch, record)) = write {
                if !self.persist(learner, epoch, record).await {
                    self.emit(ProgressEvent::sync_warning(
                        learner,
                        "Your position was saved locally; the progress store could not be reached.",
                    ));
                }
            }
            return Ok(AdvanceOutcome::Moved { to });
        }

        match self.try_level_up(learner, &curriculum, &lesson).await {
            Some((event, synced)) => {
                if !synced {
                    self.emit(ProgressEvent::sync_warning(
                        learner,
                        "Level completed, but progress has not reached the store yet. It will be retried.",
                    ));
                }
                Ok(AdvanceOutcome::LevelUp {
                    to: RouteTarget::new(event.next_level, event.next_lesson),
                    event,
                })
            }
            None => Ok(curriculum
                .next_level_after(lesson.level)
                .and_then(CurriculumLevel::first)
                .map_or(AdvanceOutcome::Finished, |first| AdvanceOutcome::Moved {
                    to: first.position(),
                })),
        }
    }

    /// The "back" control. Never persists anything.
    pub async fn back(&self, current: RouteTarget) -> Result<Option<RouteTarget>, EngineError> {
        let curriculum = self.curriculum().await?;
        Ok(guard::previous_route(&curriculum, current))
    }

    /// Clears the pending level-up notice, returning it if there was one.
    pub async fn on_level_up_acknowledged(&self, learner: LearnerId) -> Option<LevelUpEvent> {
        let mut visits = self.visits.lock().await;
        visits.get_mut(&learner).and_then(|v| v.pending_level_up.take())
    }

    /// The whole curriculum annotated with the learner's progress.
    pub async fn learning_path(&self, learner: LearnerId) -> Result<LearningPath, EngineError> {
        let curriculum = self.curriculum().await?;
        let progress = self.load_progress(learner).await?;
        let pointer = progress.pointer();

        let levels = curriculum
            .levels()
            .iter()
            .map(|level| PathLevel {
                level: level.level,
                title: level.first().and_then(|l| l.lesson_title.clone()),
                completed: level_completed(level, &progress),
                expanded: level.level <= pointer.level,
                lessons: level
                    .lessons
                    .iter()
                    .map(|lesson| PathLesson {
                        id: lesson.id,
                        page_number: lesson.page_number,
                        title: lesson.title.clone(),
                        unlocked: unlock::is_unlocked(&curriculum, lesson, &progress),
                        visited: progress.is_visited(lesson),
                        completed: progress.is_completed(lesson.id),
                        current: lesson.position() == pointer,
                    })
                    .collect(),
            })
            .collect();

        Ok(LearningPath { pointer, levels })
    }

    // ==========================================================================
    // Sync
    // ==========================================================================

    /// Re-sends the learner's cached record if the store has not acknowledged it.
    /// Returns whether the learner is in sync afterwards.
    pub async fn retry_pending(&self, learner: LearnerId) -> bool {
        let pending = self
            .cache
            .lock()
            .await
            .get(learner)
            .filter(|e| e.unsynced)
            .map(|e| (e.epoch, e.record.clone()));

        match pending {
            None => true,
            Some((epoch, record)) => {
                let synced = self.persist(learner, epoch, record).await;
                if synced {
                    tracing::info!(%learner, "Pending progress reached the store.");
                }
                synced
            }
        }
    }

    /// Forgets learners whose synced state has been idle past the idle window,
    /// along with their visit state unless a level-up notice is still pending.
    ///
    /// Unless `force` is set this is a no-op until a TTL has passed since the
    /// last sweep. Returns how many learners were evicted.
    pub async fn evict_idle(&self, force: bool) -> usize {
        let mut visits = self.visits.lock().await;
        let mut cache = self.cache.lock().await;
        if !force && !cache.sweep_due() {
            return 0;
        }
        let evicted = cache.evict_idle();
        visits.retain(|learner, visit| visit.pending_level_up.is_some() || cache.get(*learner).is_some());
        if !evicted.is_empty() {
            tracing::debug!(evicted = evicted.len(), remaining = cache.len(), "Evicted idle progress entries.");
        }
        evicted.len()
    }

    /// `retry_pending` for every learner. Returns how many are now in sync.
    pub async fn retry_all_pending(&self) -> usize {
        let pending = self.cache.lock().await.pending();
        let mut synced = 0;
        for (learner, record, epoch) in pending {
            if self.persist(learner, epoch, record).await {
                synced += 1;
            }
        }
        synced
    }

    /// Runs the level transition for `lesson` if its preconditions hold,
    /// returning the event and whether the new pointer reached the store.
    async fn try_level_up(
        &self,
        learner: LearnerId,
        curriculum: &Curriculum,
        lesson: &Lesson,
    ) -> Option<(LevelUpEvent, bool)> {
        let (event, epoch, record, unsynced_before) = {
            let mut visits = self.visits.lock().await;
            let visit = visits.entry(learner).or_default();
            let mut cache = self.cache.lock().await;
            let current = cache.get(learner)?.record.clone();
            let unsynced_before = cache.is_unsynced(learner);

            let transition = transition::maybe_advance_level(curriculum, lesson, &current, &mut visit.transition)?;
            visit.pending_level_up = Some(transition.event.clone());
            let (epoch, record) = cache.apply_local(learner, transition.record);
            (transition.event, epoch, record, unsynced_before)
        };

        tracing::info!(
            %learner,
            completed_level = event.completed_level,
            next_level = event.next_level,
            curriculum_complete = event.curriculum_complete,
            "Learner levelled up."
        );
        if unsynced_before {
            tracing::warn!(%learner, "Level transition while earlier progress is still unsynced.");
        }
        self.emit(ProgressEvent::LevelUp {
            learner,
            event: event.clone(),
        });

        let synced = self.persist(learner, epoch, record).await;
        Some((event, synced))
    }

    /// Writes `record` to the store and applies the answer to the cache.
    ///
    /// The write runs in its own task so it completes even if the caller is
    /// dropped; its result is applied only if `epoch` is still current.
    async fn persist(&self, learner: LearnerId, epoch: u64, record: ProgressRecord) -> bool {
        let store = Arc::clone(&self.store);
        let cache = Arc::clone(&self.cache);

        let write = tokio::spawn(async move {
            match store
                .set_progress(learner, record.level, record.lesson, Some(&record.completed_lesson_ids))
                .await
            {
                Ok(stored) => cache.lock().await.apply_persisted(learner, epoch, &stored),
                Err(e) if e.is_transient() => {
                    tracing::warn!(%learner, error = %e, "Failed to persist progress; keeping it locally.");
                    false
                }
                Err(e) => {
                    tracing::error!(%learner, error = %e, "Progress store rejected the write; reloading the stored record.");
                    let reloaded = store.get_progress(learner).await;
                    let mut cache = cache.lock().await;
                    if cache.get(learner).is_some_and(|entry| entry.epoch == epoch) {
                        match reloaded {
                            Ok(Some(remote)) => cache.replace(learner, remote),
                            // The next read fetches or creates the record.
                            _ => cache.remove(learner),
                        }
                    }
                    false
                }
            }
        });

        match write.await {
            Ok(synced) => synced,
            Err(e) => {
                tracing::error!(%learner, error = %e, "Progress write task failed.");
                false
            }
        }
    }

    fn emit(&self, event: ProgressEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

fn route_view(
    curriculum: &Curriculum,
    lesson: Lesson,
    progress: &ProgressRecord,
    sync_warning: bool,
    pending_level_up: Option<LevelUpEvent>,
) -> RouteView {
    let level_lessons = curriculum.lessons_in(lesson.level).to_vec();
    let mut unlocked_ids =
        unlock::effective_unlocked(curriculum, lesson.level, Some(progress), &progress.completed_lesson_ids);
    // The rendered lesson is never locked out of its own view.
    unlocked_ids.insert(lesson.id);

    let gate_satisfied = !lesson.requires_completion_gate || progress.is_completed(lesson.id);
    let is_last_in_level = curriculum.is_last_in_level(&lesson);
    let has_next = !is_last_in_level
        || curriculum.next_level_after(lesson.level).is_some()
        || progress.level <= lesson.level;

    RouteView {
        visited_indices: unlock::visited_indices(&level_lessons, progress),
        completed_ids: progress.completed_lesson_ids.clone(),
        can_go_back: curriculum.predecessor(lesson.id).is_some(),
        can_go_next: gate_satisfied && has_next,
        is_last_in_level,
        unlocked_ids,
        level_lessons,
        lesson,
        sync_warning,
        pending_level_up,
    }
}

/// Every gated lesson passed and every other lesson reached.
fn level_completed(level: &CurriculumLevel, progress: &ProgressRecord) -> bool {
    level.lessons.iter().all(|lesson| {
        progress.is_completed(lesson.id) || (!lesson.requires_completion_gate && progress.is_visited(lesson))
    })
}
