use crate::error::EventsError;
use chrono::{DateTime, Utc};
use core_types::{LearnerId, LessonId, LevelUpEvent, RouteTarget};
use serde::{Deserialize, Serialize};

/// The top-level event enum broadcast by the progress service.
///
/// Serialized with `#[serde(tag = "type", content = "payload")]`, so a level-up looks like
/// `{ "type": "LevelUp", "payload": { "learner": "...", "event": { ... } } }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ProgressEvent {
    /// The learner finished a level; show the congratulatory interstitial once.
    LevelUp { learner: LearnerId, event: LevelUpEvent },
    /// A gate was passed and added to the completed set.
    CompletionRecorded { learner: LearnerId, lesson_id: LessonId },
    /// The navigation guard sent the learner somewhere other than the requested route.
    Redirected { learner: LearnerId, from: RouteTarget, to: RouteTarget },
    /// Progress could not be written to the store; local state is kept and retried.
    SyncWarning {
        learner: LearnerId,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl ProgressEvent {
    pub fn sync_warning(learner: LearnerId, message: impl Into<String>) -> Self {
        ProgressEvent::SyncWarning {
            learner,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn learner(&self) -> LearnerId {
        match self {
            ProgressEvent::LevelUp { learner, .. }
            | ProgressEvent::CompletionRecorded { learner, .. }
            | ProgressEvent::Redirected { learner, .. }
            | ProgressEvent::SyncWarning { learner, .. } => *learner,
        }
    }

    pub fn to_json(&self) -> Result<String, EventsError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn learner() -> LearnerId {
        LearnerId::from_u128(0x1234)
    }

    #[test]
    fn serializes_as_tagged_payload() {
        let event = ProgressEvent::CompletionRecorded {
            learner: learner(),
            lesson_id: LessonId(3),
        };
        let json: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "CompletionRecorded");
        assert_eq!(json["payload"]["lesson_id"], 3);
    }

    #[test]
    fn sync_warning_carries_its_message() {
        let event = ProgressEvent::sync_warning(learner(), "store unreachable");
        assert_eq!(event.learner(), learner());
        match event {
            ProgressEvent::SyncWarning { message, .. } => {
                assert_eq!(message, "store unreachable");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
