//! HTML parsing for listing pages
//!
//! Selector profiles, tolerant field grammars and the card extractor that
//! turns one listing document into product records and a pagination signal.

pub mod card_extractor;
pub mod config;
pub mod context;
pub mod error;
pub mod grammar;

// Re-export public types
pub use card_extractor::{CardExtractor, ExtractedPage};
pub use config::CardSelectors;
pub use context::ParseContext;
pub use error::{ParsingError, ParsingResult};
