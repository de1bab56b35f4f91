//! # Progress Database Crate
//!
//! This crate is the system of record for learner progress and the curriculum
//! index, backed by PostgreSQL.
//!
//! ## Architectural Principles
//!
//! - **Adapter:** All SQL lives here. The rest of the workspace sees
//!   `ProgressRecord` and `Lesson`, never rows.
//! - **Last writer wins:** Updates overwrite the stored pointer and set; merging
//!   concurrent views is the client's job.
//! - **Asynchronous & Pooled:** Every operation is async and runs on a `PgPool`.
//!
//! ## Public API
//!
//! - `connect` / `run_migrations`: pool setup and schema management.
//! - `DbRepository`: progress and lesson queries.
//! - `DbError`: the errors this crate returns.

// Declare the modules that constitute this crate.
pub mod connection;
pub mod error;
pub mod repository;

// Re-export the key components to create a clean, public-facing API.
pub use connection::{connect, run_migrations};
pub use error::DbError;
pub use repository::{DbRepository, LessonRow, ProgressRow};
