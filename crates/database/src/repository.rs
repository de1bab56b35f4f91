use crate::DbError;
use chrono::{DateTime, Utc};
use core_types::{ContentType, Lesson, LessonId, ProgressRecord};
use serde::Serialize;
use sqlx::postgres::PgPool;
use sqlx::FromRow;
use std::collections::BTreeSet;
use uuid::Uuid;

/// The `DbRepository` provides a high-level, application-specific interface
/// to the database. It encapsulates all SQL queries and data access logic.
#[derive(Debug, Clone)]
pub struct DbRepository {
    pool: PgPool,
}

/// A row from the `user_progress` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ProgressRow {
    pub id: Uuid,
    pub level_progress: i32,
    pub lesson_progress: i32,
    pub completed_lessons: Vec<i64>,
    pub last_updated: DateTime<Utc>,
}

impl ProgressRow {
    pub fn to_record(&self) -> Result<ProgressRecord, DbError> {
        let level = u32::try_from(self.level_progress)
            .map_err(|_| DbError::InvalidData(format!("negative level_progress for {}", self.id)))?;
        let lesson = u32::try_from(self.lesson_progress)
            .map_err(|_| DbError::InvalidData(format!("negative lesson_progress for {}", self.id)))?;
        Ok(ProgressRecord::new(
            level,
            lesson,
            self.completed_lessons.iter().copied().map(LessonId),
        ))
    }
}

/// A row from the `lessons` table.
#[derive(Debug, Clone, FromRow)]
pub struct LessonRow {
    pub id: i64,
    pub level: i32,
    pub page_number: i32,
    pub page_title: String,
    pub lesson_title: Option<String>,
    pub content_type: String,
    /// `NULL` means "follow the content type".
    pub requires_completion_gate: Option<bool>,
}

impl TryFrom<LessonRow> for Lesson {
    type Error = DbError;

    fn try_from(row: LessonRow) -> Result<Self, Self::Error> {
        let content_type: ContentType = row
            .content_type
            .parse()
            .map_err(|e: core_types::CoreError| DbError::InvalidData(format!("lesson {}: {}", row.id, e)))?;
        let level = u32::try_from(row.level)
            .map_err(|_| DbError::InvalidData(format!("lesson {} has a negative level", row.id)))?;
        let page_number = u32::try_from(row.page_number)
            .map_err(|_| DbError::InvalidData(format!("lesson {} has a negative page", row.id)))?;

        let mut lesson = Lesson::new(row.id, level, page_number, content_type).with_title(row.page_title);
        lesson.lesson_title = row.lesson_title;
        if let Some(gate) = row.requires_completion_gate {
            lesson = lesson.with_gate(gate);
        }
        Ok(lesson)
    }
}

const PROGRESS_COLUMNS: &str = "id, level_progress, lesson_progress, completed_lessons, last_updated";
const LESSON_COLUMNS: &str =
    "id, level, page_number, page_title, lesson_title, content_type, requires_completion_gate";

fn to_db_ids(ids: &BTreeSet<LessonId>) -> Vec<i64> {
    ids.iter().map(|id| id.0).collect()
}

fn to_db_int(value: u32, field: &str) -> Result<i32, DbError> {
    i32::try_from(value).map_err(|_| DbError::InvalidData(format!("{} out of range: {}", field, value)))
}

impl DbRepository {
    /// Creates a new `DbRepository` with a shared database connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // ==========================================================================
    // Progress
    // ==========================================================================

    /// Fetches a learner's progress row, if one exists.
    pub async fn get_progress(&self, learner: Uuid) -> Result<Option<ProgressRow>, DbError> {
        let row = sqlx::query_as::<_, ProgressRow>(&format!(
            "SELECT {} FROM user_progress WHERE id = $1",
            PROGRESS_COLUMNS
        ))
        .bind(learner)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Inserts the default `(0, 1, ∅)` row. Fails with `AlreadyExists` if the learner has one.
    pub async fn insert_default_progress(&self, learner: Uuid) -> Result<ProgressRow, DbError> {
        let row = sqlx::query_as::<_, ProgressRow>(&format!(
            r#"
            INSERT INTO user_progress (id, level_progress, lesson_progress, completed_lessons, last_updated)
            VALUES ($1, 0, 1, '{{}}', NOW())
            ON CONFLICT (id) DO NOTHING
            RETURNING {}
            "#,
            PROGRESS_COLUMNS
        ))
        .bind(learner)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| DbError::AlreadyExists(learner.to_string()))
    }

    /// Returns the learner's row, creating the default one first when missing.
    pub async fn get_or_create_progress(&self, learner: Uuid) -> Result<ProgressRow, DbError> {
        if let Some(row) = self.get_progress(learner).await? {
            return Ok(row);
        }
        match self.insert_default_progress(learner).await {
            Ok(row) => {
                tracing::info!(%learner, "Initialized learning progress.");
                Ok(row)
            }
            // Lost a race with a concurrent first visit; the row exists now.
            Err(DbError::AlreadyExists(_)) => self.get_progress(learner).await?.ok_or(DbError::NotFound),
            Err(e) => Err(e),
        }
    }

    /// Overwrites the pointer and, when given, the completed set.
    pub async fn set_progress(
        &self,
        learner: Uuid,
        level: u32,
        lesson: u32,
        completed: Option<&BTreeSet<LessonId>>,
    ) -> Result<ProgressRow, DbError> {
        let row = sqlx::query_as::<_, ProgressRow>(&format!(
            r#"
            UPDATE user_progress
            SET level_progress = $2,
                lesson_progress = $3,
                completed_lessons = COALESCE($4, completed_lessons),
                last_updated = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            PROGRESS_COLUMNS
        ))
        .bind(learner)
        .bind(to_db_int(level, "level_progress")?)
        .bind(to_db_int(lesson, "lesson_progress")?)
        .bind(completed.map(to_db_ids))
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(DbError::NotFound)
    }

    /// Overwrites only the completed set.
    pub async fn set_completed_lessons(
        &self,
        learner: Uuid,
        completed: &BTreeSet<LessonId>,
    ) -> Result<ProgressRow, DbError> {
        let row = sqlx::query_as::<_, ProgressRow>(&format!(
            r#"
            UPDATE user_progress
            SET completed_lessons = $2, last_updated = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            PROGRESS_COLUMNS
        ))
        .bind(learner)
        .bind(to_db_ids(completed))
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(DbError::NotFound)
    }

    // ==========================================================================
    // Curriculum
    // ==========================================================================

    /// Fetches the lessons of a level ordered by page number.
    pub async fn get_lessons_for_level(&self, level: u32) -> Result<Vec<Lesson>, DbError> {
        let rows = sqlx::query_as::<_, LessonRow>(&format!(
            "SELECT {} FROM lessons WHERE level = $1 ORDER BY page_number ASC",
            LESSON_COLUMNS
        ))
        .bind(to_db_int(level, "level")?)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Lesson::try_from).collect()
    }

    /// Fetches a single lesson by its route position.
    pub async fn get_lesson(&self, level: u32, page_number: u32) -> Result<Option<Lesson>, DbError> {
        let row = sqlx::query_as::<_, LessonRow>(&format!(
            "SELECT {} FROM lessons WHERE level = $1 AND page_number = $2",
            LESSON_COLUMNS
        ))
        .bind(to_db_int(level, "level")?)
        .bind(to_db_int(page_number, "page_number")?)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Lesson::try_from).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lesson_row(content_type: &str, gate: Option<bool>) -> LessonRow {
        LessonRow {
            id: 4,
            level: 0,
            page_number: 4,
            page_title: "What is a stock?".to_string(),
            lesson_title: Some("Level 0".to_string()),
            content_type: content_type.to_string(),
            requires_completion_gate: gate,
        }
    }

    #[test]
    fn lesson_row_gate_defaults_to_content_type() {
        let lesson = Lesson::try_from(lesson_row("drag_and_drop", None)).unwrap();
        assert!(lesson.requires_completion_gate);
        assert_eq!(lesson.title, "What is a stock?");

        let lesson = Lesson::try_from(lesson_row("drag_and_drop", Some(false))).unwrap();
        assert!(!lesson.requires_completion_gate);
    }

    #[test]
    fn lesson_row_rejects_unknown_content_type() {
        assert!(matches!(
            Lesson::try_from(lesson_row("hologram", None)),
            Err(DbError::InvalidData(_))
        ));
    }

    #[test]
    fn progress_row_converts_to_record() {
        let row = ProgressRow {
            id: Uuid::nil(),
            level_progress: 1,
            lesson_progress: 2,
            completed_lessons: vec![5, 3, 5],
            last_updated: Utc::now(),
        };
        let record = row.to_record().unwrap();
        assert_eq!(record, ProgressRecord::new(1, 2, [LessonId(3), LessonId(5)]));

        let broken = ProgressRow { level_progress: -1, ..row };
        assert!(broken.to_record().is_err());
    }

    #[test]
    fn explicit_gate_overrides_an_ungated_content_type() {
        let lesson = Lesson::try_from(lesson_row("information", None)).unwrap();
        assert!(!lesson.requires_completion_gate);

        let lesson = Lesson::try_from(lesson_row("information", Some(true))).unwrap();
        assert!(lesson.requires_completion_gate);
        assert_eq!(lesson.content_type, ContentType::Information);
        assert_eq!(lesson.lesson_title.as_deref(), Some("Level 0"));
    }

    #[test]
    fn lesson_row_rejects_negative_positions() {
        let row = LessonRow {
            page_number: -1,
            ..lesson_row("quiz", None)
        };
        assert!(matches!(Lesson::try_from(row), Err(DbError::InvalidData(_))));

        let row = LessonRow {
            level: -2,
            ..lesson_row("quiz", None)
        };
        assert!(matches!(Lesson::try_from(row), Err(DbError::InvalidData(_))));
    }

    #[test]
    fn progress_row_rejects_negative_lesson() {
        let row = ProgressRow {
            id: Uuid::nil(),
            level_progress: 0,
            lesson_progress: -3,
            completed_lessons: Vec::new(),
            last_updated: Utc::now(),
        };
        assert!(matches!(row.to_record(), Err(DbError::InvalidData(_))));
    }

    #[test]
    fn pointer_beyond_the_column_range_is_invalid() {
        assert_eq!(to_db_int(7, "level").unwrap(), 7);
        assert!(matches!(to_db_int(u32::MAX, "level"), Err(DbError::InvalidData(_))));
        assert_eq!(to_db_ids(&BTreeSet::from([LessonId(9), LessonId(2)])), vec![2, 9]);
    }
}
