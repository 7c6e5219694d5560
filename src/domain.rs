//! Domain module - Core crawl types and rules
//!
//! Pure types and decisions with no I/O: product records, job input/output,
//! robots rule matching, the page-continuation rule and the persistence
//! port implemented by the infrastructure layer.

pub mod errors;
pub mod job;
pub mod pagination;
pub mod product;
pub mod repositories;
pub mod robots;

// Re-export commonly used items for convenience
pub use errors::CrawlError;
pub use job::{CrawlJobConfig, CrawlMode, CrawlState, JobResult, PageFetchState, SellerIdentity};
pub use pagination::{BranchPlan, Continuation, PageOutcome, PaginationSignal, StopReason};
pub use product::{CannabinoidRange, CategoryRef, PriceVariant, ProductCardRecord};
pub use repositories::{CatalogPersistence, JobActivity, SellerStatus, UpsertSummary};
pub use robots::{RobotsRule, RobotsRuleSet, RuleKind};
