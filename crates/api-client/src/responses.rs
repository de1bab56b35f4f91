use crate::error::StoreError;
use chrono::{DateTime, Utc};
use core_types::{ProgressRecord, parse_completed_lessons};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// The store speaks snake_case JSON wrapped in a `{status, data | message}` envelope.

/// The envelope every store endpoint answers with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> Envelope<T> {
    pub fn success(data: T) -> Self {
        Self {
            status: "success".to_string(),
            data: Some(data),
            message: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

impl Envelope<()> {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            data: None,
            message: Some(message.into()),
        }
    }
}

/// A `user_progress` row as it travels over the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressData {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub level_progress: i64,
    pub lesson_progress: i64,
    /// Kept loose: older writers stored this as a JSON-encoded string.
    #[serde(default)]
    pub completed_lessons: Value,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl ProgressData {
    pub fn from_record(id: Uuid, record: &ProgressRecord, last_updated: Option<DateTime<Utc>>) -> Self {
        Self {
            id: Some(id),
            level_progress: i64::from(record.level),
            lesson_progress: i64::from(record.lesson),
            completed_lessons: Value::Array(
                record
                    .completed_lesson_ids
                    .iter()
                    .map(|id| Value::from(id.0))
                    .collect(),
            ),
            last_updated,
        }
    }

    pub fn into_record(self) -> Result<ProgressRecord, StoreError> {
        let level = u32::try_from(self.level_progress)
            .map_err(|_| StoreError::InvalidData(format!("level_progress out of range: {}", self.level_progress)))?;
        let lesson = u32::try_from(self.lesson_progress)
            .map_err(|_| StoreError::InvalidData(format!("lesson_progress out of range: {}", self.lesson_progress)))?;
        let completed = parse_completed_lessons(&self.completed_lessons)
            .map_err(|e| StoreError::InvalidData(e.to_string()))?;
        Ok(ProgressRecord {
            level,
            lesson,
            completed_lesson_ids: completed,
        })
    }
}
