//! # Progress Events
//!
//! This crate defines the notifications the progression engine pushes to the
//! presentation layer: level-ups, recorded completions, redirects and
//! non-blocking sync warnings.
//!
//! As a Layer 0 crate, it depends only on `core-types`.

// Declare the modules that make up this crate.
pub mod error;
pub mod messages;

// Re-export the core types to provide a clean public API.
pub use error::EventsError;
pub use messages::ProgressEvent;
