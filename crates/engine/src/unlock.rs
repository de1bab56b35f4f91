//! The unlock evaluator.
//!
//! Pure functions from `(curriculum, progress)` to the set of lessons a learner
//! may navigate to. Nothing here is stored; the set is recomputed on every
//! evaluation.

use core_types::{Curriculum, Lesson, LessonId, ProgressRecord};
use std::collections::BTreeSet;

/// Whether a single lesson is unlocked under the position rules.
///
/// 1. The first lesson of the first level is always unlocked.
/// 2. Every lesson of a level below the pointer level is unlocked.
/// 3. In the pointer level, every page up to the pointer page is unlocked.
pub fn is_unlocked(curriculum: &Curriculum, lesson: &Lesson, progress: &ProgressRecord) -> bool {
    if curriculum.first_lesson().id == lesson.id {
        return true;
    }
    let pointer = progress.pointer();
    lesson.level < pointer.level || (lesson.level == pointer.level && lesson.page_number <= pointer.lesson)
}

/// The unlocked lessons of one level.
pub fn unlocked_lessons(curriculum: &Curriculum, level: u32, progress: &ProgressRecord) -> BTreeSet<LessonId> {
    curriculum
        .lessons_in(level)
        .iter()
        .filter(|lesson| is_unlocked(curriculum, lesson, progress))
        .map(|lesson| lesson.id)
        .collect()
}

/// Predecessor-completion rule for views that only know the completed set.
///
/// Position `i` of a level is unlocked when position `i - 1` is completed, and
/// position 0 always is. Where a progress pointer is available the position
/// rules win; see [`effective_unlocked`].
pub fn unlocked_by_predecessor(lessons: &[Lesson], completed: &BTreeSet<LessonId>) -> BTreeSet<LessonId> {
    lessons
        .iter()
        .enumerate()
        .filter(|(i, _)| *i == 0 || completed.contains(&lessons[i - 1].id))
        .map(|(_, lesson)| lesson.id)
        .collect()
}

/// Unlocks for a level using the pointer when there is one and the
/// predecessor-completion rule otherwise.
pub fn effective_unlocked(
    curriculum: &Curriculum,
    level: u32,
    progress: Option<&ProgressRecord>,
    completed: &BTreeSet<LessonId>,
) -> BTreeSet<LessonId> {
    match progress {
        Some(progress) => unlocked_lessons(curriculum, level, progress),
        None => unlocked_by_predecessor(curriculum.lessons_in(level), completed),
    }
}

/// 0-based positions, within `lessons`, of the lessons the pointer has reached.
pub fn visited_indices(lessons: &[Lesson], progress: &ProgressRecord) -> Vec<usize> {
    lessons
        .iter()
        .enumerate()
        .filter(|(_, lesson)| progress.is_visited(lesson))
        .map(|(i, _)| i)
        .collect()
}
