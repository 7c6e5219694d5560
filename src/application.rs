//! Application layer module
//!
//! Site adapters, the crawl orchestrator and the job service that wires
//! crawling to persistence.

pub mod adapters;
pub mod crawl_job_service;
pub mod crawl_orchestrator;
pub mod site_adapter;

pub use adapters::SiteKind;
pub use crawl_job_service::{CrawlJobService, JobReport, ScheduledJob};
pub use crawl_orchestrator::{CrawlOrchestrator, DEFAULT_CATEGORY_NAME};
pub use site_adapter::SiteAdapter;
