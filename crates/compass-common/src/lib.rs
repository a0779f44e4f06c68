//! compass-common: Shared types, errors and HTTP plumbing used across all Compass crates.

pub mod error;
pub mod entities;
pub mod templates;
pub mod sandbox;

// Re-export commonly used types
pub use entities::{DynamicQuestionState, HistoryAction, HistoryEntry, HistoryKind, Row};
pub use error::{CompassError, Result};
pub use templates::{TemplateConfig, TemplateKey};
