//! WooCommerce storefronts
//!
//! Shop archives paginate with a `/page/N/` path segment, number their
//! pagination links with `.page-numbers` and print a `.woocommerce-info`
//! notice once the archive runs out of products.

use crate::application::site_adapter::{SiteAdapter, with_page_segment};
use crate::infrastructure::parsing::config::strings;
use crate::infrastructure::parsing::{CardExtractor, CardSelectors, ExtractedPage, ParseContext, ParsingResult};

pub struct WooCommerceAdapter {
    extractor: CardExtractor,
}

impl WooCommerceAdapter {
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
            product_card: strings(&["ul.products li.product", "li.product"]),
            name: strings(&[".woocommerce-loop-product__title", "h2", "h3"]),
            link: strings(&["a.woocommerce-LoopProduct-link", "a.woocommerce-loop-product__link", "a[href]"]),
            image: strings(&["img.attachment-woocommerce_thumbnail", "img.wp-post-image", "img"]),
            price: strings(&["span.price", ".price"]),
            badge: strings(&[".onsale", ".badge"]),
            review_count: strings(&[".review-count", ".woocommerce-review-link"]),
            classification: strings(&[".strain-type", ".seed-type"]),
            variant: strings(&["[data-pack-size][data-price]", ".variations option[data-price]"]),
            out_of_stock: strings(&[".out-of-stock", ".stock.out-of-stock"]),
            in_stock: strings(&[".add_to_cart_button", ".stock.in-stock"]),
            out_of_stock_classes: strings(&["outofstock"]),
            page_links: strings(&[".woocommerce-pagination .page-numbers", "a.page-numbers"]),
            end_of_catalog: strings(&[".woocommerce-info", ".woocommerce-no-products-found"]),
            end_of_catalog_text: Some("No products were found".to_string()),
            ..CardSelectors::default()
        }
    }
}

impl SiteAdapter for WooCommerceAdapter {
    fn name(&self) -> &'static str {
        "woocommerce"
    }

    fn build_page_url(&self, base_url: &str, page: u32) -> String {
        with_page_segment(base_url, page)
    }

    fn extract_products(&self, body: &str, context: &ParseContext) -> ExtractedPage {
        self.extractor.extract_document(body, context)
    }
}
