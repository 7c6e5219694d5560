//! Crawl job input, per-page state and job output

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::CrawlError;
use super::product::{CategoryRef, ProductCardRecord};

/// How a job decides how many pages to visit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlMode {
    /// Small explicit range, used to smoke-test an adapter
    Test,
    /// Follow the site's own pagination signal
    AutoDiscover,
    /// Explicit caller-supplied range
    ManualRange,
}

impl fmt::Display for CrawlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Test => "test",
            Self::AutoDiscover => "auto",
            Self::ManualRange => "manual",
        };
        f.write_str(label)
    }
}

impl FromStr for CrawlMode {
    type Err = CrawlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "test" => Ok(Self::Test),
            "auto" | "auto_discover" | "autodiscover" => Ok(Self::AutoDiscover),
            "manual" | "manual_range" | "range" => Ok(Self::ManualRange),
            other => Err(CrawlError::InvalidJobConfig {
                reason: format!("unknown crawl mode '{other}'"),
            }),
        }
    }
}

/// Seller a job harvests for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellerIdentity {
    /// Unique display name, e.g. "Crop Circle Seeds"
    pub name: String,
    /// Site root, e.g. "https://cropcircle.example"
    pub base_url: String,
}

/// Immutable job input supplied by the external trigger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlJobConfig {
    /// Listing (or homepage, for sites with category discovery) to start from
    pub scraping_source_url: String,
    pub seller: SellerIdentity,
    pub mode: CrawlMode,
    pub start_page: Option<u32>,
    pub end_page: Option<u32>,
    /// Page bound used when neither a range nor a detected count exists
    pub fallback_max_pages: Option<u32>,
}

impl CrawlJobConfig {
    pub fn new(seller: SellerIdentity, scraping_source_url: &str, mode: CrawlMode) -> Self {
        Self {
            scraping_source_url: scraping_source_url.to_string(),
            seller,
            mode,
            start_page: None,
            end_page: None,
            fallback_max_pages: None,
        }
    }

    pub fn with_range(mut self, start_page: u32, end_page: u32) -> Self {
        self.start_page = Some(start_page);
        self.end_page = Some(end_page);
        self
    }

    pub fn with_fallback_max_pages(mut self, pages: u32) -> Self {
        self.fallback_max_pages = Some(pages);
        self
    }

    pub fn first_page(&self) -> u32 {
        self.start_page.unwrap_or(1).max(1)
    }

    /// Explicit page bound, if the mode has one.
    ///
    /// `Test` without an end page crawls only its first page.
    pub fn explicit_end_page(&self) -> Option<u32> {
        match self.mode {
            CrawlMode::Test => Some(self.end_page.unwrap_or_else(|| self.first_page())),
            CrawlMode::ManualRange => self.end_page,
            CrawlMode::AutoDiscover => None,
        }
    }

    pub fn validate(&self) -> Result<(), CrawlError> {
        if url::Url::parse(&self.scraping_source_url).is_err() {
            return Err(CrawlError::InvalidJobConfig {
                reason: format!("source url '{}' is not absolute", self.scraping_source_url),
            });
        }
        if self.seller.name.trim().is_empty() {
            return Err(CrawlError::InvalidJobConfig {
                reason: "seller name is empty".to_string(),
            });
        }
        if self.start_page == Some(0) || self.end_page == Some(0) {
            return Err(CrawlError::InvalidJobConfig {
                reason: "pages are numbered from 1".to_string(),
            });
        }
        if let Some(end) = self.explicit_end_page() {
            if end < self.first_page() {
                return Err(CrawlError::InvalidJobConfig {
                    reason: format!("end page {end} is before start page {}", self.first_page()),
                });
            }
        }
        Ok(())
    }
}

/// Retry bookkeeping for one page request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageFetchState {
    pub url: String,
    pub page_number: u32,
    pub attempt_count: u32,
    pub last_status: Option<u16>,
}

impl PageFetchState {
    pub fn new(url: &str, page_number: u32) -> Self {
        Self {
            url: url.to_string(),
            page_number,
            attempt_count: 0,
            last_status: None,
        }
    }
}

/// Orchestrator state machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CrawlState {
    Idle,
    Discovering,
    Fetching { page: u32 },
    Extracting { page: u32 },
    DecidingContinuation { page: u32 },
    Completed,
    Aborted { reason: String },
}

impl CrawlState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Aborted { .. })
    }
}

/// Output of one crawl job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub records: Vec<ProductCardRecord>,
    /// Categories in the order they were crawled
    pub categories: Vec<CategoryRef>,
    pub pages_visited: u32,
    pub success_count: u32,
    pub error_count: u32,
    pub duration_ms: u64,
    pub final_state: CrawlState,
    /// Largest max-page count detected on any branch (AutoDiscover only)
    pub detected_max_pages: Option<u32>,
    pub errors: Vec<CrawlError>,
}

impl JobResult {
    pub fn is_completed(&self) -> bool {
        self.final_state == CrawlState::Completed
    }

    /// Records harvested under one category, in crawl order
    pub fn records_for<'a>(
        &'a self,
        category: &'a CategoryRef,
    ) -> impl Iterator<Item = &'a ProductCardRecord> + 'a {
        self.records
            .iter()
            .filter(move |record| record.category.slug == category.slug)
    }

    /// Human-readable error summary for the audit log
    pub fn error_summary(&self) -> Option<String> {
        if self.errors.is_empty() {
            return None;
        }
        let lines: Vec<String> = self
            .errors
            .iter()
            .take(20)
            .map(|e| format!("[{}] {e}", e.kind()))
            .collect();
        let mut summary = lines.join("\n");
        if self.errors.len() > 20 {
            summary.push_str(&format!("\n... and {} more", self.errors.len() - 20));
        }
        Some(summary)
    }
}
