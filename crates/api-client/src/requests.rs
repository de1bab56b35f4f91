use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Body of `get_user_learning_progress` and `add_learning_user`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnerRequest {
    #[serde(alias = "id")]
    pub uid: Uuid,
}

/// Body of `set_user_learning_progress`. Omitting `completed_lessons` leaves the stored set alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetProgressRequest {
    pub uid: Uuid,
    pub level_progress: i64,
    pub lesson_progress: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_lessons: Option<Value>,
}

/// Body of `set_user_completed_lessons`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetCompletedRequest {
    pub uid: Uuid,
    pub completed_lessons: Value,
}

/// Body of `get_lesson`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonRequest {
    pub level: i64,
    pub lesson: i64,
}
