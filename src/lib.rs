//! Seed Harvester - polite catalog crawler for seed bank price comparison
//!
//! Crawls product listings of a small set of known storefronts, honouring
//! robots.txt and per-origin politeness delays, extracts product cards into
//! structured records and upserts them idempotently into SQLite.

// Module declarations
pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::{CrawlJobService, CrawlOrchestrator, JobReport, ScheduledJob, SiteAdapter, SiteKind};
pub use domain::{CrawlJobConfig, CrawlMode, JobResult, ProductCardRecord, SellerIdentity};
pub use infrastructure::AppConfig;
