//! compass-store: persistence for Compass.
//!
//! A path-addressed document store (memory or filesystem backed) with the collection
//! repositories built on it, plus the local key/value state that holds the question
//! being edited and the AI histories.

pub mod error;
pub mod document;
pub mod memory;
pub mod file;

pub mod questions;
pub mod overrides;
pub mod statistics;
pub mod users;
pub mod request_log;
pub mod rate_limits;
pub mod backup;

pub mod local;
pub mod ai_history;
pub mod session;

pub use backup::{Backup, BackupService, RestoreSummary};
pub use document::{Document, DocumentStore, ListOptions, StoredDocument};
pub use error::{Result, StoreError};
pub use file::FileStore;
pub use memory::MemoryStore;
pub use overrides::{QuestionOverrideDocument, QuestionOverrideRepository, QuestionVersion, VersionDraft};
pub use questions::{DynamicQuestionRepository, ImportSummary};
pub use rate_limits::{AiRateLimitRepository, RateLimitPolicy, RateLimitStatus, AI_RATE_LIMITS};
pub use request_log::{Operation, RequestLogEntry, RequestLogger, RequestMetadata};
pub use statistics::StatisticsRepository;
pub use users::{UserProfile, UserRepository};

pub use ai_history::{AiContentKind, AiHistory, HistorySection, QuestionnaireHistory};
pub use local::{LocalStore, SavedQuestions};
pub use session::DynamicQuestionSession;
