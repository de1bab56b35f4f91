#![allow(dead_code)]

use api_client::{CurriculumSource, ProgressStore, StoreError};
use async_trait::async_trait;
use core_types::{ContentType, Curriculum, LearnerId, Lesson, LessonId, ProgressRecord};
use engine::{ProgressService, ServiceOptions};
use events::ProgressEvent;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

/// Level 0: lessons 1..=3 (3 is gated). Level 1: lessons 4, 5 (5 is gated). Level 2: lesson 6 (gated).
pub fn lessons() -> Vec<Lesson> {
    vec![
        Lesson::new(1, 0, 1, ContentType::Information),
        Lesson::new(2, 0, 2, ContentType::Information),
        Lesson::new(3, 0, 3, ContentType::Quiz),
        Lesson::new(4, 1, 1, ContentType::Information),
        Lesson::new(5, 1, 2, ContentType::DragAndDrop),
        Lesson::new(6, 2, 1, ContentType::Quiz),
    ]
}

pub fn learner() -> LearnerId {
    LearnerId::from_u128(0xA11CE)
}

pub fn record(level: u32, lesson: u32, completed: &[i64]) -> ProgressRecord {
    ProgressRecord::new(level, lesson, completed.iter().copied().map(LessonId))
}

/// A progress store that can be told to fail or to serve stale reads.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<LearnerId, ProgressRecord>>,
    stale_read: Mutex<Option<ProgressRecord>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    reject_writes: AtomicBool,
    pub writes: AtomicUsize,
}

impl MemoryStore {
    pub fn seeded(learner: LearnerId, record: ProgressRecord) -> Arc<Self> {
        let store = Self::default();
        store.records.lock().unwrap().insert(learner, record);
        Arc::new(store)
    }

    pub fn stored(&self, learner: LearnerId) -> Option<ProgressRecord> {
        self.records.lock().unwrap().get(&learner).cloned()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Writes fail with a non-transient error.
    pub fn reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    /// The next reads return `record` regardless of what was written.
    pub fn serve_stale(&self, record: Option<ProgressRecord>) {
        *self.stale_read.lock().unwrap() = record;
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

fn unavailable() -> StoreError {
    StoreError::Api {
        status: 503,
        message: "progress store unavailable".to_string(),
    }
}

#[async_trait]
impl ProgressStore for MemoryStore {
    async fn get_progress(&self, learner: LearnerId) -> Result<Option<ProgressRecord>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        if let Some(stale) = self.stale_read.lock().unwrap().clone() {
            return Ok(Some(stale));
        }
        Ok(self.stored(learner))
    }

    async fn set_progress(
        &self,
        learner: LearnerId,
        level: u32,
        lesson: u32,
        completed: Option<&BTreeSet<LessonId>>,
    ) -> Result<ProgressRecord, StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(StoreError::InvalidData("completed_lessons rejected".to_string()));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut records = self.records.lock().unwrap();
        let existing = records
            .get_mut(&learner)
            .ok_or_else(|| StoreError::NotFound(learner.to_string()))?;
        existing.level = level;
        existing.lesson = lesson;
        if let Some(completed) = completed {
            existing.completed_lesson_ids = completed.clone();
        }
        Ok(existing.clone())
    }

    async fn create_default_progress(&self, learner: LearnerId) -> Result<ProgressRecord, StoreError> {
        let mut records = self.records.lock().unwrap();
        Ok(records.entry(learner).or_insert_with(ProgressRecord::new_learner).clone())
    }
}

pub struct MemoryLessons {
    lessons: Vec<Lesson>,
}

impl MemoryLessons {
    pub fn new(lessons: Vec<Lesson>) -> Arc<Self> {
        Arc::new(Self { lessons })
    }
}

#[async_trait]
impl CurriculumSource for MemoryLessons {
    async fn get_lessons_for_level(&self, level: u32) -> Result<Vec<Lesson>, StoreError> {
        let mut lessons: Vec<Lesson> = self.lessons.iter().filter(|l| l.level == level).cloned().collect();
        lessons.sort_by_key(|l| l.page_number);
        Ok(lessons)
    }

    async fn get_lesson(&self, level: u32, page_number: u32) -> Result<Option<Lesson>, StoreError> {
        Ok(self
            .lessons
            .iter()
            .find(|l| l.level == level && l.page_number == page_number)
            .cloned())
    }
}

pub fn service(store: Arc<MemoryStore>) -> ProgressService {
    ProgressService::new(store, MemoryLessons::new(lessons()), ServiceOptions::default())
}

pub fn curriculum() -> Curriculum {
    Curriculum::from_lessons(lessons()).unwrap()
}

/// Everything currently buffered on the receiver.
pub fn drain(rx: &mut broadcast::Receiver<ProgressEvent>) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn level_ups(events: &[ProgressEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, ProgressEvent::LevelUp { .. }))
        .count()
}
