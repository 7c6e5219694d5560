//! Shopify collections
//!
//! Sellers group products into collections linked from the header menu.
//! Collection pages paginate with `?page=N` and serve images from a
//! protocol-relative CDN host.

use crate::application::site_adapter::{SiteAdapter, with_page_query};
use crate::domain::product::CategoryRef;
use crate::infrastructure::parsing::config::strings;
use crate::infrastructure::parsing::{CardExtractor, CardSelectors, ExtractedPage, ParseContext, ParsingResult};

pub struct ShopifyAdapter {
    extractor: CardExtractor,
}

impl ShopifyAdapter {
    pub fn new() -> ParsingResult<Self> {
        Self::with_selectors(&Self::selectors())
    }

    pub fn with_selectors(selectors: &CardSelectors) -> ParsingResult<Self> {
        Ok(Self {
            extractor: CardExtractor::new(selectors)?,
        })
    }

    pub fn selectors() -> CardSelectors {
        CardSelectors {
            product_card: strings(&[".product-card", ".grid-product", ".card-wrapper"]),
            name: strings(&[".product-card__title", ".grid-product__title", ".card__heading"]),
            link: strings(&["a.product-card__link", "a.full-unstyled-link", "a[href*='/products/']"]),
            image: strings(&["img.product-card__image", "img"]),
            price: strings(&[".price-item--sale", ".price-item--regular", ".product-card__price", ".price"]),
            badge: strings(&[".badge", ".product-card__badge"]),
            rating: strings(&[".rating", "[data-rating]"]),
            review_count: strings(&[".rating-count", ".review-count"]),
            out_of_stock: strings(&[".badge--sold-out", ".sold-out"]),
            in_stock: Vec::new(),
            out_of_stock_classes: strings(&["sold-out", "product-card--sold-out"]),
            page_links: strings(&[".pagination a", ".pagination__item"]),
            end_of_catalog: strings(&[".collection--empty", ".collection-empty"]),
            end_of_catalog_text: None,
            category_links: strings(&[
                "header nav a[href*='/collections/']",
                ".header__menu-item[href*='/collections/']",
            ]),
            ..CardSelectors::default()
        }
    }
}

impl SiteAdapter for ShopifyAdapter {
    fn name(&self) -> &'static str {
        "shopify"
    }

    fn build_page_url(&self, base_url: &str, page: u32) -> String {
        with_page_query(base_url, "page", page)
    }

    fn extract_products(&self, body: &str, context: &ParseContext) -> ExtractedPage {
        self.extractor.extract_document(body, context)
    }

    fn supports_discovery(&self) -> bool {
        true
    }

    fn discover_category_links(&self, homepage: &str, page_url: &str) -> Vec<CategoryRef> {
        self.extractor.category_links(homepage, page_url)
    }
}
