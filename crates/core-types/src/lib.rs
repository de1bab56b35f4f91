//! # Core Types
//!
//! The foundational vocabulary of the learning platform: lessons and the
//! curriculum they form, a learner's progress record, quiz gate results and
//! the level-up notification.
//!
//! As a Layer 0 crate it has no knowledge of storage, HTTP or the UI. Every
//! other crate in the workspace speaks in these types.

pub mod curriculum;
pub mod error;
pub mod events;
pub mod gate;
pub mod lesson;
pub mod progress;

// Re-export the core types to provide a clean public API.
pub use curriculum::{Curriculum, CurriculumLevel};
pub use error::CoreError;
pub use events::LevelUpEvent;
pub use gate::GateResult;
pub use lesson::{ContentType, Lesson, LessonId};
pub use progress::{ProgressRecord, RouteTarget, parse_completed_lessons};

/// Learners are identified by the UUID of their account.
pub type LearnerId = uuid::Uuid;
