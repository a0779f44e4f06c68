//! compass-stats: RPL statistics for the ORKG templates Compass tracks.
//!
//! Paper ids come from the template's SPARQL paper query; every paper's statement bundle is
//! fetched from the ORKG REST API and counted, and the template totals are written to
//! `Templates/<templateId>/Statistics/<statisticId>`.

pub mod analysis;
pub mod error;
pub mod orkg;
pub mod service;

pub use analysis::{analyze_paper, GlobalStatistics, PaperAnalysis};
pub use error::{Result, StatsError};
pub use orkg::{OrkgClient, RetryConfig, Statement, DEFAULT_API_BASE};
pub use service::{Progress, StatisticsService, UpdateOptions, UpdateReport, UpdateStatus};
