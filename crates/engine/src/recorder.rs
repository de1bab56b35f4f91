//! The completion recorder.

use core_types::{LessonId, ProgressRecord};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub record: ProgressRecord,
    /// False for a replayed completion; the record is then unchanged.
    pub newly_recorded: bool,
}

/// Adds `lesson_id` to the completed set.
///
/// The pointer is left alone: passing a gate and moving past a lesson are
/// separate facts.
pub fn record_completion(progress: &ProgressRecord, lesson_id: LessonId) -> Completion {
    if progress.is_completed(lesson_id) {
        return Completion {
            record: progress.clone(),
            newly_recorded: false,
        };
    }
    let mut record = progress.clone();
    record.completed_lesson_ids.insert(lesson_id);
    Completion {
        record,
        newly_recorded: true,
    }
}
