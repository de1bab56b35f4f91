//! What the presentation layer receives back from the progress service.

use core_types::{LessonId, Lesson, LevelUpEvent, ProgressRecord, RouteTarget};
use serde::Serialize;
use std::collections::BTreeSet;

/// Everything needed to render an allowed lesson route.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteView {
    pub lesson: Lesson,
    pub level_lessons: Vec<Lesson>,
    pub unlocked_ids: BTreeSet<LessonId>,
    pub visited_indices: Vec<usize>,
    pub completed_ids: BTreeSet<LessonId>,
    pub is_last_in_level: bool,
    pub can_go_back: bool,
    pub can_go_next: bool,
    /// Local progress exists that the store has not acknowledged yet.
    pub sync_warning: bool,
    /// A level-up waiting for the learner to acknowledge it.
    pub pending_level_up: Option<LevelUpEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RouteOutcome {
    Render(Box<RouteView>),
    Redirect { to: RouteTarget },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GateOutcome {
    pub record: ProgressRecord,
    /// False when the result was a failure or a replay of an earlier pass.
    pub newly_completed: bool,
    pub level_up: Option<LevelUpEvent>,
    /// Whether the store acknowledged everything written by this call.
    pub synced: bool,
}

/// Result of the "next" control.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdvanceOutcome {
    /// The lesson's gate has not been passed yet.
    Blocked { lesson_id: LessonId },
    Moved { to: RouteTarget },
    LevelUp { to: RouteTarget, event: LevelUpEvent },
    /// There is nothing after this lesson.
    Finished,
    /// The lesson the learner tried to leave is not one they may be on.
    Redirect { to: RouteTarget },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathLesson {
    pub id: LessonId,
    pub page_number: u32,
    pub title: String,
    pub unlocked: bool,
    pub visited: bool,
    pub completed: bool,
    pub current: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathLevel {
    pub level: u32,
    pub title: Option<String>,
    /// Every lesson of the level has been completed.
    pub completed: bool,
    /// The level has been reached and is shown open.
    pub expanded: bool,
    pub lessons: Vec<PathLesson>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LearningPath {
    pub pointer: RouteTarget,
    pub levels: Vec<PathLevel>,
}
