use crate::error::CoreError;
use crate::lesson::LessonId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The normalized outcome of a quiz or activity, whatever widget produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateResult {
    pub lesson_id: LessonId,
    pub passed: bool,
}

impl GateResult {
    pub fn passed(lesson_id: LessonId) -> Self {
        Self { lesson_id, passed: true }
    }

    pub fn failed(lesson_id: LessonId) -> Self {
        Self { lesson_id, passed: false }
    }

    /// Normalizes a widget completion payload.
    ///
    /// Accepted shapes: a bare boolean, `{"isComplete": bool}`, `{"passed": bool}`,
    /// `{"correct": bool}` and `{"score": n, "total": m}` (passed when `score >= total > 0`).
    pub fn from_payload(lesson_id: LessonId, payload: &Value) -> Result<Self, CoreError> {
        let invalid = |reason: &str| CoreError::InvalidGatePayload(lesson_id.0, reason.to_string());

        let passed = match payload {
            Value::Bool(b) => *b,
            Value::Object(map) => {
                if let Some(flag) = ["isComplete", "is_complete", "passed", "correct"]
                    .iter()
                    .find_map(|key| map.get(*key))
                {
                    flag.as_bool().ok_or_else(|| invalid("completion flag is not a boolean"))?
                } else if let (Some(score), Some(total)) = (map.get("score"), map.get("total")) {
                    let score = score.as_f64().ok_or_else(|| invalid("score is not a number"))?;
                    let total = total.as_f64().ok_or_else(|| invalid("total is not a number"))?;
                    total > 0.0 && score >= total
                } else {
                    return Err(invalid("no recognised completion field"));
                }
            }
            _ => return Err(invalid("expected a boolean or an object")),
        };

        Ok(Self { lesson_id, passed })
    }
}
