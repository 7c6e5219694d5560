//! Selector profiles for listing pages
//!
//! Every field is a list of fallbacks tried in order. Optional fields may be
//! empty; `product_card`, `name` and `link` must each contain at least one
//! valid selector.

use serde::{Deserialize, Serialize};

/// CSS selectors for one storefront family
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CardSelectors {
    /// One element per product card
    pub product_card: Vec<String>,
    pub name: Vec<String>,
    /// Anchor whose `href` is the product URL
    pub link: Vec<String>,
    pub image: Vec<String>,
    pub price: Vec<String>,
    pub badge: Vec<String>,
    pub rating: Vec<String>,
    pub review_count: Vec<String>,
    pub classification: Vec<String>,
    pub thc: Vec<String>,
    pub cbd: Vec<String>,
    /// "Label: value" rows (THC, CBD, flowering time, difficulty, type)
    pub attribute_row: Vec<String>,
    /// Elements carrying pack size / price pairs
    pub variant: Vec<String>,
    /// Presence inside the card means sold out
    pub out_of_stock: Vec<String>,
    /// Presence inside the card means purchasable
    pub in_stock: Vec<String>,
    /// Classes on the card element itself that mean sold out
    pub out_of_stock_classes: Vec<String>,

    /// Numbered links in the pagination widget
    pub page_links: Vec<String>,
    /// "No more products" marker
    pub end_of_catalog: Vec<String>,
    /// Text the marker must contain, case-insensitive; empty means any
    pub end_of_catalog_text: Option<String>,
    /// Category navigation links on the homepage
    pub category_links: Vec<String>,
}

pub(crate) fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(ToString::to_string).collect()
}

impl Default for CardSelectors {
    fn default() -> Self {
        Self {
            product_card: strings(&["li.product", ".product-item", ".product-card", "article.product"]),
            name: strings(&[".product-title", ".product-name", ".product-item-link", "h2", "h3"]),
            link: strings(&["a.product-link", "a.product-item-link", "a[href]"]),
            image: strings(&["img"]),
            price: strings(&[".price", ".product-price"]),
            badge: strings(&[".badge", ".onsale", ".product-label"]),
            rating: strings(&[".star-rating", ".rating", "[data-rating]"]),
            review_count: strings(&[".review-count", ".reviews-count"]),
            classification: strings(&[".strain-type", ".seed-type"]),
            thc: strings(&[".thc", "[data-thc]"]),
            cbd: strings(&[".cbd", "[data-cbd]"]),
            attribute_row: strings(&[".product-attributes li", ".attributes li", "dl.attributes div"]),
            variant: strings(&["[data-pack-size][data-price]", "[data-pack][data-price]"]),
            out_of_stock: strings(&[".out-of-stock", ".sold-out"]),
            in_stock: strings(&[".in-stock", ".add_to_cart_button"]),
            out_of_stock_classes: strings(&["outofstock", "sold-out"]),
            page_links: strings(&[".pagination a", ".page-numbers", ".pages a"]),
            end_of_catalog: strings(&[".no-products", ".empty-catalog"]),
            end_of_catalog_text: None,
            category_links: Vec::new(),
        }
    }
}
