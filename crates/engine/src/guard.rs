//! The navigation guard.
//!
//! Decides whether a requested lesson route is rendered or redirected. Locked
//! and unknown routes are ordinary outcomes, never errors.

use crate::unlock;
use core_types::{Curriculum, Lesson, ProgressRecord, RouteTarget};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", content = "to", rename_all = "snake_case")]
pub enum RouteDecision {
    Allow,
    Redirect(RouteTarget),
}

/// The inputs of a guard evaluation as they resolve.
///
/// Evaluating with only one of them would redirect on partial data, so
/// [`Readiness::authorize`] answers `None` until both have arrived.
#[derive(Debug, Default)]
pub struct Readiness<'a> {
    progress: Option<&'a ProgressRecord>,
    curriculum: Option<&'a Curriculum>,
}

impl<'a> Readiness<'a> {
    pub fn with_progress(mut self, progress: &'a ProgressRecord) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_curriculum(mut self, curriculum: &'a Curriculum) -> Self {
        self.curriculum = Some(curriculum);
        self
    }

    pub fn is_ready(&self) -> bool {
        self.progress.is_some() && self.curriculum.is_some()
    }

    pub fn authorize(&self, requested: RouteTarget) -> Option<RouteDecision> {
        Some(authorize(requested, self.progress?, self.curriculum?))
    }
}

pub fn authorize(requested: RouteTarget, progress: &ProgressRecord, curriculum: &Curriculum) -> RouteDecision {
    let pointer = progress.pointer();

    if requested.level > pointer.level {
        return RouteDecision::Redirect(settle(pointer, progress, curriculum));
    }

    // Unknown pages are treated as not found and sent to the start.
    let Some(lesson) = curriculum.lesson_at(requested.level, requested.lesson) else {
        return redirect_unless_here(requested, curriculum.first_lesson().position());
    };

    if unlock::is_unlocked(curriculum, lesson, progress) {
        return RouteDecision::Allow;
    }

    match last_completed(progress, curriculum) {
        Some(done) => match curriculum.successor(done.id) {
            Some(next) => redirect_unless_here(requested, settle(next.position(), progress, curriculum)),
            // Nothing after the last completed lesson: stay on it rather than hit a dead end.
            None if done.level <= pointer.level => redirect_unless_here(requested, done.position()),
            None => RouteDecision::Redirect(settle(pointer, progress, curriculum)),
        },
        None => redirect_unless_here(requested, curriculum.first_lesson().position()),
    }
}

/// The previous page in curriculum order, crossing into the previous level.
pub fn previous_route(curriculum: &Curriculum, current: RouteTarget) -> Option<RouteTarget> {
    let lesson = curriculum.lesson_at(current.level, current.lesson)?;
    curriculum.predecessor(lesson.id).map(Lesson::position)
}

/// The last lesson, in curriculum order, whose gate has been passed.
fn last_completed<'c>(progress: &ProgressRecord, curriculum: &'c Curriculum) -> Option<&'c Lesson> {
    curriculum.iter().filter(|l| progress.is_completed(l.id)).last()
}

/// Moves a redirect target onto a route the guard would allow.
///
/// A locked or unknown target falls back to the pointer, and a pointer outside
/// the curriculum falls back to the first lesson, which is always unlocked.
fn settle(target: RouteTarget, progress: &ProgressRecord, curriculum: &Curriculum) -> RouteTarget {
    let allowed = |t: RouteTarget| {
        curriculum
            .lesson_at(t.level, t.lesson)
            .is_some_and(|l| unlock::is_unlocked(curriculum, l, progress))
    };
    if allowed(target) {
        return target;
    }
    let pointer = progress.pointer();
    if allowed(pointer) {
        return pointer;
    }
    curriculum.first_lesson().position()
}

fn redirect_unless_here(requested: RouteTarget, target: RouteTarget) -> RouteDecision {
    if requested == target {
        RouteDecision::Allow
    } else {
        RouteDecision::Redirect(target)
    }
}
