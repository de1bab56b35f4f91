//! The level transition and its per-visit guard.

use chrono::Utc;
use core_types::{Curriculum, Lesson, LevelUpEvent, ProgressRecord, RouteTarget};

/// Tracks whether the current visit has already produced a level-up.
///
/// A visit is identified by its route. The guard re-arms only when the route
/// changes, so repeated evaluations of the same route cannot fire twice.
#[derive(Debug, Clone, Default)]
pub struct TransitionGuard {
    epoch: Option<RouteTarget>,
    transitioned: bool,
}

impl TransitionGuard {
    /// Records the route being evaluated, re-arming the guard on a new route.
    pub fn observe(&mut self, route: RouteTarget) {
        if self.epoch != Some(route) {
            self.epoch = Some(route);
            self.transitioned = false;
        }
    }

    pub fn already_transitioned(&self) -> bool {
        self.transitioned
    }

    pub fn epoch(&self) -> Option<RouteTarget> {
        self.epoch
    }

    fn mark(&mut self) {
        self.transitioned = true;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelTransition {
    pub record: ProgressRecord,
    pub event: LevelUpEvent,
}

/// Advances the learner to the next level when they stand on the last lesson
/// of their current level with its gate satisfied, once per visit.
///
/// Standing on the lesson means the pointer has reached it; a gate passed
/// through a stale link to a lesson further ahead does not count.
///
/// The new pointer is the first page of the next level. After the final level
/// the pointer moves to `(level + 1, 1)` and the event reports a finished
/// curriculum. Re-walking an earlier level never transitions.
pub fn maybe_advance_level(
    curriculum: &Curriculum,
    lesson: &Lesson,
    progress: &ProgressRecord,
    guard: &mut TransitionGuard,
) -> Option<LevelTransition> {
    guard.observe(lesson.position());

    let gate_satisfied = !lesson.requires_completion_gate || progress.is_completed(lesson.id);
    if guard.already_transitioned()
        || !gate_satisfied
        || !curriculum.is_last_in_level(lesson)
        || progress.level != lesson.level
        || progress.pointer() < lesson.position()
    {
        return None;
    }

    let (next_level, next_lesson, curriculum_complete) = match curriculum.next_level_after(lesson.level) {
        Some(next) => (next.level, next.first().map_or(1, |l| l.page_number), false),
        None => (lesson.level + 1, 1, true),
    };

    guard.mark();
    let record = ProgressRecord {
        level: next_level,
        lesson: next_lesson,
        completed_lesson_ids: progress.completed_lesson_ids.clone(),
    };
    Some(LevelTransition {
        record,
        event: LevelUpEvent {
            completed_level: lesson.level,
            next_level,
            next_lesson,
            curriculum_complete,
            timestamp: Utc::now(),
        },
    })
}
