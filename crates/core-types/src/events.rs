use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raised once when a learner finishes the last lesson of a level and the
/// progress pointer moves on to the next one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelUpEvent {
    pub completed_level: u32,
    pub next_level: u32,
    pub next_lesson: u32,
    /// Set when the completed level was the last one in the curriculum.
    pub curriculum_complete: bool,
    pub timestamp: DateTime<Utc>,
}
