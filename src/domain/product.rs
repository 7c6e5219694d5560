//! Product card records harvested from listing pages
//!
//! A `ProductCardRecord` is everything a single product card on a listing page
//! tells us. Identity inside a job is the canonical URL; identity inside the
//! catalog is the slug derived from the product name.

use serde::{Deserialize, Serialize};
use url::Url;

/// Category a record was harvested under
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CategoryRef {
    pub name: String,
    pub slug: String,
    /// Listing URL of the category (page 1)
    pub url: String,
}

impl CategoryRef {
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.trim().to_string(),
            slug: slugify(name),
            url: url.to_string(),
        }
    }
}

/// THC / CBD content as parsed from free text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CannabinoidRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
    /// Text the range was parsed from, kept for display and audits
    pub raw_text: String,
}

/// One purchasable pack size of a product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceVariant {
    pub pack_size: u32,
    pub total_price: f64,
    pub price_per_seed: f64,
}

impl PriceVariant {
    /// Build a variant, returning `None` for a zero pack or a non-positive price
    pub fn new(pack_size: u32, total_price: f64) -> Option<Self> {
        if pack_size == 0 || !total_price.is_finite() || total_price <= 0.0 {
            return None;
        }
        Some(Self {
            pack_size,
            total_price,
            price_per_seed: total_price / f64::from(pack_size),
        })
    }
}

/// Structured data extracted from one product card
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductCardRecord {
    pub name: String,
    pub canonical_url: String,
    pub slug: String,
    pub category: CategoryRef,
    pub image_url: Option<String>,
    pub classification: Option<String>,
    pub badge: Option<String>,
    pub rating: Option<f32>,
    pub review_count: Option<u32>,
    pub thc_range: Option<CannabinoidRange>,
    pub cbd_range: Option<CannabinoidRange>,
    pub flowering_time: Option<String>,
    pub growth_difficulty: Option<String>,
    /// Listing price as displayed ("$45.00 – $120.00")
    pub price_text: Option<String>,
    /// `None` when the site does not expose stock state on the card
    pub in_stock: Option<bool>,
    pub price_variants: Vec<PriceVariant>,
}

impl ProductCardRecord {
    /// Minimal record with identity fields filled in; everything else empty
    pub fn new(name: &str, url: &str, category: CategoryRef) -> Self {
        let name = collapse_whitespace(name);
        Self {
            slug: slugify(&name),
            name,
            canonical_url: canonicalize_url(url),
            category,
            image_url: None,
            classification: None,
            badge: None,
            rating: None,
            review_count: None,
            thc_range: None,
            cbd_range: None,
            flowering_time: None,
            growth_difficulty: None,
            price_text: None,
            in_stock: None,
            price_variants: Vec::new(),
        }
    }

    /// Cheapest price per seed across all pack variants
    pub fn best_price_per_seed(&self) -> Option<f64> {
        self.price_variants
            .iter()
            .map(|v| v.price_per_seed)
            .min_by(f64::total_cmp)
    }
}

/// Deterministic URL-safe slug: lowercase alphanumerics separated by single dashes
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;

    for c in name.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(c.to_lowercase());
        } else if c == '\'' || c == '’' {
            // "Jack's" -> "jacks"
        } else {
            pending_dash = true;
        }
    }

    slug
}

/// Canonical form of a product URL used for job-wide dedup.
///
/// Drops the fragment and noise query keys (tracking, cart, sort order,
/// variant pickers), sorts the remaining pairs and trims a trailing slash
/// from the path. Keys that identify a product, like `?product=gelato` on
/// plain permalinks, are kept. Strings that are not absolute URLs are
/// returned trimmed.
pub fn canonicalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    match Url::parse(trimmed) {
        Ok(mut url) => {
            url.set_fragment(None);
            let path = url.path().to_string();
            if path.len() > 1 && path.ends_with('/') {
                url.set_path(path.trim_end_matches('/'));
            }

            let mut pairs: Vec<(String, String)> = url
                .query_pairs()
                .filter(|(key, _)| !is_noise_query_key(key))
                .map(|(key, value)| (key.into_owned(), value.into_owned()))
                .collect();
            pairs.sort();
            url.set_query(None);
            if !pairs.is_empty() {
                url.query_pairs_mut().extend_pairs(&pairs);
            }
            url.to_string()
        }
        Err(_) => trimmed.to_string(),
    }
}

const NOISE_QUERY_KEYS: &[&str] = &[
    "ref",
    "variant",
    "add-to-cart",
    "orderby",
    "order",
    "sort",
    "fbclid",
    "gclid",
];

fn is_noise_query_key(key: &str) -> bool {
    key.starts_with("utm_") || NOISE_QUERY_KEYS.contains(&key)
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
