//! Magento storefronts
//!
//! Catalogs are split into categories reachable from the top navigation.
//! Category listings paginate with `?p=N`.

use crate::application::site_adapter::{SiteAdapter, with_page_query};
use crate::domain::product::CategoryRef;
use crate::infrastructure::parsing::config::strings;
use crate::infrastructure::parsing::{CardExtractor, CardSelectors, ExtractedPage, ParseContext, ParsingResult};

pub struct MagentoAdapter {
    extractor: CardExtractor,
}

impl MagentoAdapter {
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
            product_card: strings(&["li.product-item", ".product-item-info"]),
            name: strings(&[".product-item-link", ".product-item-name"]),
            link: strings(&["a.product-item-link", "a.product-item-photo", "a[href]"]),
            image: strings(&["img.product-image-photo", "img"]),
            price: strings(&[".price-box .price", ".price"]),
            badge: strings(&[".product-label", ".sticker"]),
            rating: strings(&[".rating-result", "[data-rating]"]),
            review_count: strings(&[".reviews-actions a", ".review-count"]),
            classification: strings(&[".strain-type", ".product-attribute-type"]),
            out_of_stock: strings(&[".stock.unavailable", ".out-of-stock"]),
            in_stock: strings(&["button.tocart", ".stock.available"]),
            out_of_stock_classes: strings(&["unavailable"]),
            page_links: strings(&[".pages .item .page span:not(.label)", ".pages a"]),
            end_of_catalog: strings(&[".message.info.empty", ".message.empty"]),
            end_of_catalog_text: None,
            category_links: strings(&["nav.navigation li.level0 > a", ".navigation a.level-top"]),
            ..CardSelectors::default()
        }
    }
}

impl SiteAdapter for MagentoAdapter {
    fn name(&self) -> &'static str {
        "magento"
    }

    fn build_page_url(&self, base_url: &str, page: u32) -> String {
        with_page_query(base_url, "p", page)
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
