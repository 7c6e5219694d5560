//! Infrastructure layer for HTTP, robots policy, parsing, persistence,
//! configuration and logging

pub mod catalog_repository;
pub mod config;
pub mod database_connection;
pub mod delay_planner;
pub mod http_client;
pub mod logging;
pub mod parsing;
pub mod robots_resolver;

// Re-export commonly used items
pub use catalog_repository::SqliteCatalogRepository;
pub use config::{AppConfig, ConfigManager, SiteEntry};
pub use database_connection::DatabaseConnection;
pub use delay_planner::DelayPlanner;
pub use http_client::{DocumentFetcher, FetchError, FetchedDocument, HttpClient, HttpClientConfig};
pub use logging::{get_log_directory, init_logging, init_logging_with_config};
pub use parsing::{CardExtractor, CardSelectors, ExtractedPage, ParseContext, ParsingError};
pub use robots_resolver::RobotsPolicyResolver;
