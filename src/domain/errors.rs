//! Crawl failure taxonomy
//!
//! None of these terminate the host process. Each variant maps to a degrade
//! strategy in the orchestrator and ends up in `JobResult::errors` and the
//! audit log.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CrawlError {
    /// robots.txt disallows the URL; only the affected branch is abandoned
    #[error("Blocked by robots.txt: {url}")]
    RobotsBlocked { url: String },

    /// Retry budget exhausted; the page is skipped
    #[error("Page fetch failed after {attempts} attempt(s): {url} ({reason})")]
    PageFetchFailed {
        url: String,
        attempts: u32,
        status: Option<u16>,
        reason: String,
    },

    /// One malformed product card, skipped
    #[error("Card {index} on page {page} skipped: {reason}")]
    ExtractionFieldError { page: u32, index: usize, reason: String },

    /// No page count could be determined; the branch stopped early
    #[error("Pagination undetected for {url}, stopped after page {page}")]
    PaginationUndetected { url: String, page: u32 },

    /// One record failed to persist
    #[error("Failed to persist {slug}: {reason}")]
    PersistenceWriteError { slug: String, reason: String },

    #[error("Job cancelled at page boundary")]
    Cancelled,

    #[error("Invalid crawl job configuration: {reason}")]
    InvalidJobConfig { reason: String },
}

impl CrawlError {
    /// Whether this error counts towards `JobResult::error_count`.
    ///
    /// An undetected page count is a normal stop, not a failure.
    pub fn is_counted(&self) -> bool {
        !matches!(self, Self::PaginationUndetected { .. } | Self::Cancelled)
    }

    /// Short machine-friendly kind label used in the audit log
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RobotsBlocked { .. } => "robots_blocked",
            Self::PageFetchFailed { .. } => "page_fetch_failed",
            Self::ExtractionFieldError { .. } => "extraction_field_error",
            Self::PaginationUndetected { .. } => "pagination_undetected",
            Self::PersistenceWriteError { .. } => "persistence_write_error",
            Self::Cancelled => "cancelled",
            Self::InvalidJobConfig { .. } => "invalid_job_config",
        }
    }
}
