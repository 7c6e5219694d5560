//! Repository interfaces for the seller catalog
//!
//! Contains trait definitions for persisting crawl output.

use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::errors::CrawlError;
use crate::domain::job::{CrawlMode, SellerIdentity};
use crate::domain::product::{CategoryRef, ProductCardRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SellerStatus {
    Idle,
    Running,
    Completed,
    Failed,
}

impl SellerStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for SellerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one `upsert_products` call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpsertSummary {
    /// Newly created products
    pub saved: u32,
    /// Existing products whose mutable fields or variants changed
    pub updated: u32,
    /// Records that failed to persist
    pub errors: u32,
    pub failures: Vec<CrawlError>,
}

impl UpsertSummary {
    pub fn merge(&mut self, other: Self) {
        self.saved += other.saved;
        self.updated += other.updated;
        self.errors += other.errors;
        self.failures.extend(other.failures);
    }
}

/// One append-only audit entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobActivity {
    pub job_id: String,
    pub seller_id: i64,
    pub status: SellerStatus,
    pub mode: CrawlMode,
    pub pages_visited: u32,
    pub success_count: u32,
    pub error_count: u32,
    pub saved_count: u32,
    pub updated_count: u32,
    pub duration_ms: u64,
    pub error_detail: Option<String>,
}

/// Idempotent writes of the Seller -> Category -> Product graph
#[async_trait]
pub trait CatalogPersistence: Send + Sync {
    /// Create or refresh the seller by unique name; returns its id
    async fn upsert_seller(&self, seller: &SellerIdentity, status: SellerStatus) -> Result<i64>;

    /// Set status and `last_scraped_at`
    async fn touch_seller(&self, seller_id: i64, status: SellerStatus) -> Result<()>;

    /// Max-page count remembered from the seller's last AutoDiscover run
    async fn last_known_max_pages(&self, seller_id: i64) -> Result<Option<u32>>;

    async fn remember_max_pages(&self, seller_id: i64, max_pages: u32) -> Result<()>;

    async fn upsert_category(&self, seller_id: i64, category: &CategoryRef) -> Result<i64>;

    /// Per-record upsert; a failing record is counted, not propagated
    async fn upsert_products(&self, category_id: i64, records: &[ProductCardRecord]) -> Result<UpsertSummary>;

    async fn log_job_activity(&self, activity: &JobActivity) -> Result<()>;
}
