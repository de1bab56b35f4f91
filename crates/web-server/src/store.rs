//! The database seen through the progress store boundary, so the in-process
//! progress service talks to the same tables the REST API serves.

use api_client::{CurriculumSource, ProgressStore, StoreError};
use async_trait::async_trait;
use core_types::{LearnerId, Lesson, LessonId, ProgressRecord};
use database::{DbError, DbRepository};
use std::collections::BTreeSet;

#[derive(Debug, Clone)]
pub struct DbProgressStore {
    repo: DbRepository,
}

impl DbProgressStore {
    pub fn new(repo: DbRepository) -> Self {
        Self { repo }
    }
}

fn store_error(e: DbError) -> StoreError {
    match e {
        DbError::NotFound => StoreError::NotFound("progress record".to_string()),
        DbError::InvalidData(message) => StoreError::InvalidData(message),
        DbError::AlreadyExists(who) => StoreError::Api {
            status: 409,
            message: format!("progress already exists for {}", who),
        },
        // Pool and connection failures are worth retrying.
        other => StoreError::Api {
            status: 503,
            message: other.to_string(),
        },
    }
}

#[async_trait]
impl ProgressStore for DbProgressStore {
    async fn get_progress(&self, learner: LearnerId) -> Result<Option<ProgressRecord>, StoreError> {
        match self.repo.get_progress(learner).await.map_err(store_error)? {
            Some(row) => Ok(Some(row.to_record().map_err(store_error)?)),
            None => Ok(None),
        }
    }

    async fn set_progress(
        &self,
        learner: LearnerId,
        level: u32,
        lesson: u32,
        completed: Option<&BTreeSet<LessonId>>,
    ) -> Result<ProgressRecord, StoreError> {
        self.repo
            .set_progress(learner, level, lesson, completed)
            .await
            .and_then(|row| row.to_record())
            .map_err(store_error)
    }

    async fn create_default_progress(&self, learner: LearnerId) -> Result<ProgressRecord, StoreError> {
        self.repo
            .get_or_create_progress(learner)
            .await
            .and_then(|row| row.to_record())
            .map_err(store_error)
    }
}

#[async_trait]
impl CurriculumSource for DbProgressStore {
    async fn get_lessons_for_level(&self, level: u32) -> Result<Vec<Lesson>, StoreError> {
        self.repo.get_lessons_for_level(level).await.map_err(store_error)
    }

    async fn get_lesson(&self, level: u32, page_number: u32) -> Result<Option<Lesson>, StoreError> {
        self.repo.get_lesson(level, page_number).await.map_err(store_error)
    }
}
