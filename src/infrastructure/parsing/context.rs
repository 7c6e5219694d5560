//! Parsing context for listing-page extraction

use crate::domain::product::CategoryRef;

/// Where the document being parsed came from
#[derive(Debug, Clone)]
pub struct ParseContext {
    /// Page number within the category branch
    pub page_number: u32,

    /// URL the document was fetched from; relative links resolve against it
    pub page_url: String,

    /// Category every extracted record is filed under
    pub category: CategoryRef,
}

impl ParseContext {
    pub fn new(page_number: u32, page_url: &str, category: CategoryRef) -> Self {
        Self {
            page_number,
            page_url: page_url.to_string(),
            category,
        }
    }
}
