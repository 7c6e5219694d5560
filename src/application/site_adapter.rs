//! Per-site capability consumed by the crawl orchestrator
//!
//! An adapter knows how one storefront family paginates, where its category
//! navigation lives and which markup a product card uses. It never performs
//! I/O; the orchestrator fetches and hands it document bodies.

use url::Url;

use crate::domain::product::CategoryRef;
use crate::infrastructure::parsing::{ExtractedPage, ParseContext};

pub trait SiteAdapter: Send + Sync {
    /// Storefront family label used in logs
    fn name(&self) -> &'static str;

    /// URL of listing page `page` of the category whose first page is `base_url`
    fn build_page_url(&self, base_url: &str, page: u32) -> String;

    /// Cards plus the pagination signal found in one listing document
    fn extract_products(&self, body: &str, context: &ParseContext) -> ExtractedPage;

    /// Whether the catalog is split across navigable category pages
    fn supports_discovery(&self) -> bool {
        false
    }

    /// Category entry points linked from `homepage`
    fn discover_category_links(&self, _homepage: &str, _page_url: &str) -> Vec<CategoryRef> {
        Vec::new()
    }
}

/// Set `key=page` on `base_url`, dropping it for page 1.
/// Page 1 of a URL without `key` is `base_url` itself.
pub(crate) fn with_page_query(base_url: &str, key: &str, page: u32) -> String {
    let Ok(mut url) = Url::parse(base_url) else {
        return base_url.to_string();
    };
    if page == 1 && !url.query_pairs().any(|(name, _)| name == key) {
        return base_url.to_string();
    }
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(name, _)| name != key)
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();

    url.set_query(None);
    if !kept.is_empty() || page > 1 {
        let mut pairs = url.query_pairs_mut();
        for (name, value) in &kept {
            pairs.append_pair(name, value);
        }
        if page > 1 {
            pairs.append_pair(key, &page.to_string());
        }
    }
    url.to_string()
}

/// Replace any `/page/N/` suffix of `base_url` with page `page`'s segment.
/// Page 1 of a URL without that suffix is `base_url` itself.
pub(crate) fn with_page_segment(base_url: &str, page: u32) -> String {
    let Ok(mut url) = Url::parse(base_url) else {
        return base_url.to_string();
    };
    let mut segments: Vec<String> = url
        .path()
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(ToString::to_string)
        .collect();
    if segments.len() >= 2
        && segments[segments.len() - 2] == "page"
        && segments[segments.len() - 1].parse::<u32>().is_ok()
    {
        segments.truncate(segments.len() - 2);
    } else if page == 1 {
        return base_url.to_string();
    }
    if page > 1 {
        segments.push("page".to_string());
        segments.push(page.to_string());
    }

    let path = if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}/", segments.join("/"))
    };
    url.set_path(&path);
    url.to_string()
}
