//! Listing-page extraction driven by a [`CardSelectors`] profile
//!
//! `scraper::Html` is not `Send`, so documents are parsed and fully consumed
//! inside one synchronous call and never held across an `.await`.

use std::collections::HashSet;

use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};
use url::Url;

use super::config::CardSelectors;
use super::context::ParseContext;
use super::error::{ParsingError, ParsingResult};
use super::grammar::{parse_cannabinoid_range, parse_count, parse_pack_size, parse_price, parse_rating};
use crate::domain::errors::CrawlError;
use crate::domain::pagination::PaginationSignal;
use crate::domain::product::{
    CannabinoidRange, CategoryRef, PriceVariant, ProductCardRecord, canonicalize_url, collapse_whitespace,
};

/// Attributes that hold the real image URL on lazy-loaded cards, best first
const LAZY_IMAGE_ATTRS: &[&str] = &["data-src", "data-lazy-src", "data-original", "data-srcset", "srcset"];

const PACK_ATTRS: &[&str] = &["data-pack-size", "data-pack", "data-seeds"];

/// Everything one listing page yielded
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedPage {
    /// Valid records, unique by canonical URL within the page
    pub records: Vec<ProductCardRecord>,
    /// One `ExtractionFieldError` per malformed card
    pub skipped: Vec<CrawlError>,
    pub signal: PaginationSignal,
    /// Card elements found, malformed ones included
    pub cards_seen: usize,
}

pub struct CardExtractor {
    product_card: Vec<Selector>,
    name: Vec<Selector>,
    link: Vec<Selector>,
    image: Vec<Selector>,
    price: Vec<Selector>,
    badge: Vec<Selector>,
    rating: Vec<Selector>,
    review_count: Vec<Selector>,
    classification: Vec<Selector>,
    thc: Vec<Selector>,
    cbd: Vec<Selector>,
    attribute_row: Vec<Selector>,
    variant: Vec<Selector>,
    out_of_stock: Vec<Selector>,
    in_stock: Vec<Selector>,
    out_of_stock_classes: Vec<String>,
    page_links: Vec<Selector>,
    end_of_catalog: Vec<Selector>,
    end_of_catalog_text: Option<String>,
    category_links: Vec<Selector>,
}

impl CardExtractor {
    pub fn new(selectors: &CardSelectors) -> ParsingResult<Self> {
        Ok(Self {
            product_card: compile_required("product_card", &selectors.product_card)?,
            name: compile_required("name", &selectors.name)?,
            link: compile_required("link", &selectors.link)?,
            image: compile_optional(&selectors.image),
            price: compile_optional(&selectors.price),
            badge: compile_optional(&selectors.badge),
            rating: compile_optional(&selectors.rating),
            review_count: compile_optional(&selectors.review_count),
            classification: compile_optional(&selectors.classification),
            thc: compile_optional(&selectors.thc),
            cbd: compile_optional(&selectors.cbd),
            attribute_row: compile_optional(&selectors.attribute_row),
            variant: compile_optional(&selectors.variant),
            out_of_stock: compile_optional(&selectors.out_of_stock),
            in_stock: compile_optional(&selectors.in_stock),
            out_of_stock_classes: selectors.out_of_stock_classes.clone(),
            page_links: compile_optional(&selectors.page_links),
            end_of_catalog: compile_optional(&selectors.end_of_catalog),
            end_of_catalog_text: selectors
                .end_of_catalog_text
                .as_ref()
                .map(|text| text.to_lowercase()),
            category_links: compile_optional(&selectors.category_links),
        })
    }

    /// Parse `body` and extract cards plus the pagination signal
    pub fn extract_document(&self, body: &str, context: &ParseContext) -> ExtractedPage {
        let html = Html::parse_document(body);
        self.extract_page(&html, context)
    }

    pub fn extract_page(&self, html: &Html, context: &ParseContext) -> ExtractedPage {
        let mut page = ExtractedPage {
            signal: self.pagination_signal(html),
            ..ExtractedPage::default()
        };
        let mut seen = HashSet::new();

        // First card selector that matches anything wins
        let cards: Vec<ElementRef<'_>> = self
            .product_card
            .iter()
            .map(|selector| html.select(selector).collect::<Vec<_>>())
            .find(|cards| !cards.is_empty())
            .unwrap_or_default();
        page.cards_seen = cards.len();

        for (index, card) in cards.iter().enumerate() {
            match self.extract_card(card, context) {
                Ok(record) => {
                    if seen.insert(record.canonical_url.clone()) {
                        page.records.push(record);
                    } else {
                        debug!(url = %record.canonical_url, page = context.page_number, "Duplicate card on page");
                    }
                }
                Err(e) => {
                    warn!(page = context.page_number, index, error = %e, "⚠️ Skipping malformed product card");
                    page.skipped.push(CrawlError::ExtractionFieldError {
                        page: context.page_number,
                        index,
                        reason: e.to_string(),
                    });
                }
            }
        }

        debug!(
            page = context.page_number,
            cards = page.cards_seen,
            records = page.records.len(),
            skipped = page.skipped.len(),
            max_pages = ?page.signal.max_pages,
            end_of_catalog = page.signal.end_of_catalog,
            "Listing page extracted"
        );
        page
    }

    /// Highest page number in the pagination widget and the end marker
    pub fn pagination_signal(&self, html: &Html) -> PaginationSignal {
        let max_pages = self
            .page_links
            .iter()
            .flat_map(|selector| html.select(selector))
            .filter_map(|link| text_of(&link).parse::<u32>().ok())
            .filter(|page| *page > 0)
            .max();

        let end_of_catalog = self
            .end_of_catalog
            .iter()
            .flat_map(|selector| html.select(selector))
            .any(|marker| match &self.end_of_catalog_text {
                Some(expected) => text_of(&marker).to_lowercase().contains(expected.as_str()),
                None => true,
            });

        PaginationSignal {
            max_pages,
            end_of_catalog,
        }
    }

    /// Same-origin category links found on `page_url`, unique by URL
    pub fn category_links(&self, body: &str, page_url: &str) -> Vec<CategoryRef> {
        let Ok(base) = Url::parse(page_url) else {
            return Vec::new();
        };
        let html = Html::parse_document(body);
        let own_url = canonicalize_url(page_url);
        let mut seen = HashSet::new();
        let mut categories = Vec::new();

        for link in self.category_links.iter().flat_map(|selector| html.select(selector)) {
            let Some(href) = link.value().attr("href") else {
                continue;
            };
            let Ok(url) = base.join(href) else {
                continue;
            };
            if url.origin() != base.origin() {
                continue;
            }
            let name = text_of(&link);
            let canonical = canonicalize_url(url.as_str());
            if name.is_empty() || canonical == own_url || !seen.insert(canonical) {
                continue;
            }
            categories.push(CategoryRef::new(&name, url.as_str()));
        }
        categories
    }

    fn extract_card(&self, card: &ElementRef<'_>, context: &ParseContext) -> ParsingResult<ProductCardRecord> {
        let name = first_text(card, &self.name)
            .ok_or_else(|| ParsingError::required_field_missing("name", Some("product card")))?;
        let href = first_attr(card, &self.link, &["href"])
            .or_else(|| card.value().attr("href").map(ToString::to_string))
            .ok_or_else(|| ParsingError::required_field_missing("link", Some("product card")))?;
        let url = resolve_url(&href, &context.page_url)?;

        let mut record = ProductCardRecord::new(&name, &url, context.category.clone());
        record.image_url = self.extract_image(card, &context.page_url);
        record.price_text = first_text(card, &self.price);
        record.badge = first_text(card, &self.badge);
        record.classification = first_text(card, &self.classification);
        record.rating = self.extract_rating(card);
        record.review_count = first_text(card, &self.review_count).and_then(|text| parse_count(&text));
        record.thc_range = cannabinoid(card, &self.thc, "data-thc");
        record.cbd_range = cannabinoid(card, &self.cbd, "data-cbd");
        self.apply_attribute_rows(card, &mut record);
        record.price_variants = self.extract_variants(card);
        record.in_stock = self.extract_stock(card);

        Ok(record)
    }

    fn extract_image(&self, card: &ElementRef<'_>, page_url: &str) -> Option<String> {
        for image in self.image.iter().flat_map(|selector| card.select(selector)) {
            let element = image.value();
            let lazy = LAZY_IMAGE_ATTRS
                .iter()
                .filter_map(|attr| element.attr(attr))
                .map(first_srcset_url)
                .find(|src| !src.is_empty());
            let src = lazy.or_else(|| {
                element
                    .attr("src")
                    .map(str::trim)
                    .filter(|src| !src.is_empty() && !src.starts_with("data:"))
            });
            if let Some(src) = src {
                if let Ok(url) = resolve_url(src, page_url) {
                    return Some(url);
                }
            }
        }
        None
    }

    fn extract_rating(&self, card: &ElementRef<'_>) -> Option<f32> {
        for element in self.rating.iter().flat_map(|selector| card.select(selector)) {
            let value = element.value();
            let candidates = ["data-rating", "aria-label", "title"]
                .iter()
                .filter_map(|attr| value.attr(attr).map(ToString::to_string))
                .chain(std::iter::once(text_of(&element)))
                .chain(
                    element
                        .children()
                        .filter_map(ElementRef::wrap)
                        .filter_map(|child| child.value().attr("style").map(ToString::to_string)),
                );
            for candidate in candidates {
                if let Some(rating) = parse_rating(&candidate) {
                    return Some(rating);
                }
            }
        }
        None
    }

    fn apply_attribute_rows(&self, card: &ElementRef<'_>, record: &mut ProductCardRecord) {
        for row in self.attribute_row.iter().flat_map(|selector| card.select(selector)) {
            let text = text_of(&row);
            let Some((label, value)) = text.split_once(':') else {
                continue;
            };
            let label = label.trim().to_lowercase();
            let value = value.trim();
            if value.is_empty() {
                continue;
            }

            if label.contains("thc") {
                if record.thc_range.is_none() {
                    record.thc_range = parse_cannabinoid(value);
                }
            } else if label.contains("cbd") {
                if record.cbd_range.is_none() {
                    record.cbd_range = parse_cannabinoid(value);
                }
            } else if label.contains("flower") {
                record.flowering_time.get_or_insert_with(|| value.to_string());
            } else if label.contains("difficult") {
                record.growth_difficulty.get_or_insert_with(|| value.to_string());
            } else if label.contains("type") || label.contains("genetic") {
                record.classification.get_or_insert_with(|| value.to_string());
            }
        }
    }

    fn extract_variants(&self, card: &ElementRef<'_>) -> Vec<PriceVariant> {
        let mut variants: Vec<PriceVariant> = Vec::new();

        for element in self.variant.iter().flat_map(|selector| card.select(selector)) {
            let value = element.value();
            let pack = PACK_ATTRS
                .iter()
                .find_map(|attr| value.attr(attr))
                .and_then(parse_pack_size)
                .or_else(|| parse_pack_size(&text_of(&element)));
            let price = value
                .attr("data-price")
                .and_then(parse_price)
                .or_else(|| first_text(&element, &self.price).and_then(|text| parse_price(&text)));

            let Some(variant) = pack.zip(price).and_then(|(pack, price)| PriceVariant::new(pack, price)) else {
                debug!(markup = %text_of(&element), "Unreadable pack variant");
                continue;
            };
            if !variants.iter().any(|v| v.pack_size == variant.pack_size) {
                variants.push(variant);
            }
        }

        variants.sort_by_key(|v| v.pack_size);
        variants
    }

    fn extract_stock(&self, card: &ElementRef<'_>) -> Option<bool> {
        let sold_out_class = card
            .value()
            .classes()
            .any(|class| self.out_of_stock_classes.iter().any(|c| c == class));
        if sold_out_class || any_match(card, &self.out_of_stock) {
            Some(false)
        } else if any_match(card, &self.in_stock) {
            Some(true)
        } else {
            None
        }
    }
}

fn compile_required(field: &str, selector_strings: &[String]) -> ParsingResult<Vec<Selector>> {
    let mut errors = Vec::new();
    let selectors = compile(selector_strings, &mut errors);
    if selectors.is_empty() {
        return Err(ParsingError::NoValidSelectors {
            field: field.to_string(),
            errors: if errors.is_empty() {
                "no selectors configured".to_string()
            } else {
                errors.join(", ")
            },
        });
    }
    Ok(selectors)
}

fn compile_optional(selector_strings: &[String]) -> Vec<Selector> {
    let mut errors = Vec::new();
    compile(selector_strings, &mut errors)
}

fn compile(selector_strings: &[String], errors: &mut Vec<String>) -> Vec<Selector> {
    let mut selectors = Vec::new();
    for selector_str in selector_strings {
        match Selector::parse(selector_str) {
            Ok(selector) => selectors.push(selector),
            Err(e) => {
                warn!("Failed to compile selector '{}': {}", selector_str, e);
                errors.push(
                    ParsingError::InvalidSelector {
                        selector: selector_str.clone(),
                        reason: e.to_string(),
                    }
                    .to_string(),
                );
            }
        }
    }
    selectors
}

fn text_of(element: &ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

fn first_text(element: &ElementRef<'_>, selectors: &[Selector]) -> Option<String> {
    selectors
        .iter()
        .flat_map(|selector| element.select(selector))
        .map(|found| text_of(&found))
        .find(|text| !text.is_empty())
}

fn first_attr(element: &ElementRef<'_>, selectors: &[Selector], attrs: &[&str]) -> Option<String> {
    selectors
        .iter()
        .flat_map(|selector| element.select(selector))
        .find_map(|found| {
            attrs
                .iter()
                .find_map(|attr| found.value().attr(attr))
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(ToString::to_string)
        })
}

fn any_match(element: &ElementRef<'_>, selectors: &[Selector]) -> bool {
    selectors
        .iter()
        .any(|selector| element.select(selector).next().is_some())
}

/// Text first, then the data attribute; bare numbers are read as percentages
fn cannabinoid(card: &ElementRef<'_>, selectors: &[Selector], data_attr: &str) -> Option<CannabinoidRange> {
    first_text(card, selectors)
        .or_else(|| first_attr(card, selectors, &[data_attr]))
        .and_then(|text| parse_cannabinoid(&text))
}

fn parse_cannabinoid(text: &str) -> Option<CannabinoidRange> {
    parse_cannabinoid_range(text).or_else(|| {
        if text.contains('%') {
            return None;
        }
        let mut range = parse_cannabinoid_range(&format!("{text}%"))?;
        range.raw_text = collapse_whitespace(text);
        Some(range)
    })
}

/// `"a.jpg 300w, b.jpg 600w"` -> `"a.jpg"`
fn first_srcset_url(value: &str) -> &str {
    value
        .split(',')
        .next()
        .and_then(|candidate| candidate.split_whitespace().next())
        .unwrap_or("")
}

/// Resolve `href` against the page it was found on
pub fn resolve_url(href: &str, page_url: &str) -> ParsingResult<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return Err(ParsingError::url_resolution_failed(href, "not a navigable link"));
    }
    let base = Url::parse(page_url).map_err(|e| ParsingError::url_resolution_failed(page_url, e))?;
    base.join(href)
        .map(String::from)
        .map_err(|e| ParsingError::url_resolution_failed(href, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE_URL: &str = "https://seeds.test/shop/page/2/";

    fn extractor() -> CardExtractor {
        CardExtractor::new(&CardSelectors::default()).unwrap()
    }

    fn context() -> ParseContext {
        ParseContext::new(2, PAGE_URL, CategoryRef::new("All Seeds", "https://seeds.test/shop/"))
    }

    const CARD: &str = r#"
    <ul>
      <li class="product instock">
        <a class="product-link" href="/product/blue-dream/?ref=grid">
          <img src="data:image/gif;base64,R0lGOD" data-src="//cdn.seeds.test/blue-dream.jpg">
          <h2 class="product-title">  Blue   Dream </h2>
        </a>
        <span class="onsale">Sale!</span>
        <div class="star-rating" aria-label="Rated 4.50 out of 5"></div>
        <span class="review-count">(12 reviews)</span>
        <ul class="product-attributes">
          <li>THC: 20-24%</li>
          <li>CBD: under 1%</li>
          <li>Flowering time: 8-9 weeks</li>
          <li>Difficulty: Easy</li>
          <li>Type: Feminized</li>
        </ul>
        <span class="price">$36.00 – $100.00</span>
        <select>
          <option data-pack-size="10" data-price="100.00">10 seeds</option>
          <option data-pack-size="3" data-price="36.00">3 seeds</option>
          <option data-pack-size="3" data-price="39.00">3 seeds (dup)</option>
        </select>
        <a class="add_to_cart_button" href="?add-to-cart=1">Add</a>
      </li>
    </ul>"#;

    #[test]
    fn extracts_every_card_field() {
        let page = extractor().extract_document(CARD, &context());
        assert_eq!(page.cards_seen, 1);
        assert!(page.skipped.is_empty());
        let record = &page.records[0];

        assert_eq!(record.name, "Blue Dream");
        assert_eq!(record.slug, "blue-dream");
        assert_eq!(record.canonical_url, "https://seeds.test/product/blue-dream");
        assert_eq!(record.image_url.as_deref(), Some("https://cdn.seeds.test/blue-dream.jpg"));
        assert_eq!(record.badge.as_deref(), Some("Sale!"));
        assert_eq!(record.rating, Some(4.5));
        assert_eq!(record.review_count, Some(12));
        let thc = record.thc_range.as_ref().unwrap();
        assert_eq!((thc.min, thc.max), (Some(20.0), Some(24.0)));
        let cbd = record.cbd_range.as_ref().unwrap();
        assert_eq!((cbd.min, cbd.max), (None, Some(1.0)));
        assert_eq!(record.flowering_time.as_deref(), Some("8-9 weeks"));
        assert_eq!(record.growth_difficulty.as_deref(), Some("Easy"));
        assert_eq!(record.classification.as_deref(), Some("Feminized"));
        assert_eq!(record.price_text.as_deref(), Some("$36.00 – $100.00"));
        assert_eq!(record.in_stock, Some(true));

        let packs: Vec<(u32, f64, f64)> = record
            .price_variants
            .iter()
            .map(|v| (v.pack_size, v.total_price, v.price_per_seed))
            .collect();
        assert_eq!(packs, vec![(3, 36.0, 12.0), (10, 100.0, 10.0)]);
    }

    #[test]
    fn malformed_card_is_skipped_not_fatal() {
        let body = r#"
        <li class="product"><a href="/p/one"><h2>One</h2></a></li>
        <li class="product"><h2>No link here</h2></li>
        <li class="product"><a href="/p/three"></a></li>
        <li class="product"><a href="/p/four"><h2>Four</h2></a></li>"#;
        let page = extractor().extract_document(body, &context());
        assert_eq!(page.cards_seen, 4);
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.skipped.len(), 2);
        assert!(matches!(
            page.skipped[0],
            CrawlError::ExtractionFieldError { page: 2, index: 1, .. }
        ));
    }

    #[test]
    fn duplicate_product_url_yields_one_record() {
        let body = r#"
        <li class="product"><a href="/p/gelato/"><h2>Gelato</h2></a></li>
        <li class="product"><a href="https://seeds.test/p/gelato#reviews"><h2>Gelato</h2></a></li>"#;
        let page = extractor().extract_document(body, &context());
        assert_eq!(page.cards_seen, 2);
        assert_eq!(page.records.len(), 1);
        assert!(page.skipped.is_empty());
    }

    #[test]
    fn plain_permalinks_stay_distinct() {
        let body = r#"
        <li class="product"><a href="/?product=gelato"><h2>Gelato</h2></a></li>
        <li class="product"><a href="/?product=zkittlez&utm_source=feed"><h2>Zkittlez</h2></a></li>"#;
        let page = extractor().extract_document(body, &context());
        let records: Vec<(&str, &str)> = page
            .records
            .iter()
            .map(|r| (r.name.as_str(), r.canonical_url.as_str()))
            .collect();
        assert_eq!(
            records,
            vec![
                ("Gelato", "https://seeds.test/?product=gelato"),
                ("Zkittlez", "https://seeds.test/?product=zkittlez"),
            ]
        );
    }

    #[test]
    fn sold_out_class_on_card() {
        let body = r#"<li class="product outofstock"><a href="/p/x"><h2>X</h2></a><a class="add_to_cart_button">Read more</a></li>"#;
        let page = extractor().extract_document(body, &context());
        assert_eq!(page.records[0].in_stock, Some(false));
    }

    #[test]
    fn pagination_signal_from_widget_and_marker() {
        let extractor = extractor();
        let html = Html::parse_document(
            r#"<nav class="pagination"><a>1</a><a>2</a><a>14</a><a>Next →</a></nav>"#,
        );
        assert_eq!(extractor.pagination_signal(&html), PaginationSignal::with_max_pages(14));

        let html = Html::parse_document(r#"<p class="no-products">Nothing here</p>"#);
        assert!(extractor.pagination_signal(&html).end_of_catalog);
    }

    #[test]
    fn end_marker_text_must_match_when_configured() {
        let selectors = CardSelectors {
            end_of_catalog: vec![".woocommerce-info".to_string()],
            end_of_catalog_text: Some("No products were found".to_string()),
            ..CardSelectors::default()
        };
        let extractor = CardExtractor::new(&selectors).unwrap();
        let cart_notice = Html::parse_document(r#"<div class="woocommerce-info">Free shipping over $100</div>"#);
        assert!(!extractor.pagination_signal(&cart_notice).end_of_catalog);
        let empty = Html::parse_document(
            r#"<div class="woocommerce-info">No products were found matching your selection.</div>"#,
        );
        assert!(extractor.pagination_signal(&empty).end_of_catalog);
    }

    #[test]
    fn category_links_are_same_origin_and_unique() {
        let selectors = CardSelectors {
            category_links: vec!["nav a".to_string()],
            ..CardSelectors::default()
        };
        let extractor = CardExtractor::new(&selectors).unwrap();
        let body = r#"<nav>
            <a href="/feminized/">Feminized</a>
            <a href="/feminized/?sort=price">Feminized again</a>
            <a href="https://elsewhere.test/autos/">Partner</a>
            <a href="/autoflower/">Autoflower</a>
            <a href="/">Home</a>
        </nav>"#;
        let categories = extractor.category_links(body, "https://seeds.test/");
        let names: Vec<&str> = categories.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Feminized", "Autoflower"]);
        assert_eq!(categories[1].slug, "autoflower");
    }

    #[test]
    fn missing_required_selectors_fail_construction() {
        let selectors = CardSelectors {
            name: vec!["[[[".to_string()],
            ..CardSelectors::default()
        };
        assert!(matches!(
            CardExtractor::new(&selectors),
            Err(ParsingError::NoValidSelectors { .. })
        ));
    }

    #[test]
    fn url_resolution() {
        assert_eq!(
            resolve_url("//cdn.seeds.test/a.jpg", PAGE_URL).unwrap(),
            "https://cdn.seeds.test/a.jpg"
        );
        assert_eq!(resolve_url("../x", PAGE_URL).unwrap(), "https://seeds.test/shop/x");
        assert!(resolve_url("#top", PAGE_URL).is_err());
    }
}
