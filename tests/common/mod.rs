//! Shared fixtures for integration tests: an in-memory storefront and
//! generated listing markup.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use seed_harvester::application::CrawlOrchestrator;
use seed_harvester::domain::{CrawlJobConfig, CrawlMode, SellerIdentity};
use seed_harvester::infrastructure::config::PolitenessConfig;
use seed_harvester::infrastructure::{
    DelayPlanner, DocumentFetcher, FetchError, FetchedDocument, RobotsPolicyResolver,
};

/// One scripted response
#[derive(Debug, Clone)]
pub enum Reply {
    Body(String),
    Status(u16),
    Timeout,
}

/// Serves scripted replies per URL and records every request with the
/// (possibly paused) tokio clock. The last reply of a script repeats;
/// unknown URLs answer 404.
#[derive(Default)]
pub struct FakeSite {
    routes: Mutex<HashMap<String, VecDeque<Reply>>>,
    requests: Mutex<Vec<(String, Instant)>>,
}

impl FakeSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(self, url: &str, body: impl Into<String>) -> Self {
        self.script(url, vec![Reply::Body(body.into())])
    }

    pub fn status(self, url: &str, status: u16) -> Self {
        self.script(url, vec![Reply::Status(status)])
    }

    pub fn script(self, url: &str, replies: Vec<Reply>) -> Self {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), replies.into());
        self
    }

    /// Every requested URL in order, robots.txt included
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|(url, _)| url.clone())
            .collect()
    }

    /// Requested URLs except robots.txt
    pub fn page_requests(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter(|url| !url.ends_with("/robots.txt"))
            .collect()
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests().iter().filter(|requested| *requested == url).count()
    }

    /// Instants of every request, robots.txt included
    pub fn request_times(&self) -> Vec<Instant> {
        self.requests.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }

    /// Instants of non-robots requests
    pub fn page_request_times(&self) -> Vec<Instant> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(url, _)| !url.ends_with("/robots.txt"))
            .map(|(_, at)| *at)
            .collect()
    }
}

#[async_trait]
impl DocumentFetcher for FakeSite {
    async fn fetch(&self, url: &str) -> Result<FetchedDocument, FetchError> {
        self.requests
            .lock()
            .unwrap()
            .push((url.to_string(), Instant::now()));

        let reply = {
            let mut routes = self.routes.lock().unwrap();
            match routes.get_mut(url) {
                Some(script) if script.len() > 1 => script.pop_front(),
                Some(script) => script.front().cloned(),
                None => None,
            }
        };

        match reply {
            Some(Reply::Body(body)) => Ok(FetchedDocument::ok(url, body)),
            Some(Reply::Status(status)) => Ok(FetchedDocument::with_status(url, status)),
            Some(Reply::Timeout) => Err(FetchError::Timeout { url: url.to_string() }),
            None => Ok(FetchedDocument::with_status(url, 404)),
        }
    }
}

pub fn politeness(min_delay_ms: u64, max_delay_ms: u64) -> PolitenessConfig {
    PolitenessConfig {
        min_delay_ms,
        max_delay_ms,
        ..PolitenessConfig::default()
    }
}

pub fn orchestrator(site: &Arc<FakeSite>, politeness: &PolitenessConfig) -> CrawlOrchestrator {
    let fetcher: Arc<dyn DocumentFetcher> = site.clone();
    let planner = DelayPlanner::new(politeness);
    let robots = Arc::new(RobotsPolicyResolver::new(
        fetcher.clone(),
        planner.clone(),
        "SeedHarvester",
        Duration::from_secs(86_400),
    ));
    CrawlOrchestrator::new(fetcher, robots, planner)
}

pub fn job(seller: &str, source_url: &str, mode: CrawlMode) -> CrawlJobConfig {
    let base_url = url::Url::parse(source_url)
        .map(|url| url.origin().ascii_serialization())
        .unwrap_or_default();
    CrawlJobConfig::new(
        SellerIdentity {
            name: seller.to_string(),
            base_url,
        },
        source_url,
        mode,
    )
}

// WooCommerce markup

pub fn woo_card(name: &str, price: f64) -> String {
    let slug = name.to_lowercase().replace(' ', "-");
    format!(
        r#"<li class="product type-product instock">
  <a href="/product/{slug}/" class="woocommerce-LoopProduct-link">
    <img src="data:image/gif;base64,R0lGODlhAQABAAAAACw=" data-src="/wp-content/uploads/{slug}.jpg">
    <h2 class="woocommerce-loop-product__title">{name}</h2>
    <span class="price">${price:.2}</span>
  </a>
  <ul class="product-attributes"><li>THC: 18-22%</li><li>CBD: under 1%</li></ul>
  <select class="packs">
    <option data-pack-size="5" data-price="{price:.2}">5 Seeds</option>
    <option data-pack-size="10" data-price="{double:.2}">10 Seeds</option>
  </select>
  <a href="?add-to-cart=1" class="button add_to_cart_button">Add to cart</a>
</li>"#,
        double = price * 1.8
    )
}

/// Card without a product link
pub fn woo_malformed_card() -> String {
    r#"<li class="product type-product"><h2 class="woocommerce-loop-product__title">Mystery Pack</h2></li>"#
        .to_string()
}

pub fn woo_cards(prefix: &str, count: usize) -> Vec<String> {
    (1..=count)
        .map(|n| woo_card(&format!("{prefix} {n}"), 30.0 + n as f64))
        .collect()
}

pub fn woo_page(cards: &[String], max_page: Option<u32>) -> String {
    let pagination = max_page
        .map(|max| {
            let links: String = (1..=max)
                .map(|n| format!(r#"<li><a class="page-numbers" href="/shop/page/{n}/">{n}</a></li>"#))
                .collect();
            format!(r#"<nav class="woocommerce-pagination"><ul class="page-numbers">{links}</ul></nav>"#)
        })
        .unwrap_or_default();
    format!(
        r#"<html><body><main><ul class="products columns-4">{}</ul>{pagination}</main></body></html>"#,
        cards.join("\n")
    )
}

pub fn woo_empty_page() -> String {
    r#"<html><body><main><div class="woocommerce-no-products-found">
    <div class="woocommerce-info">No products were found matching your selection.</div>
    </div></main></body></html>"#
        .to_string()
}

/// `https://woo.test/shop/` for page 1, `/shop/page/N/` afterwards
pub fn woo_url(page: u32) -> String {
    if page == 1 {
        "https://woo.test/shop/".to_string()
    } else {
        format!("https://woo.test/shop/page/{page}/")
    }
}

// Magento markup

pub fn magento_homepage(categories: &[(&str, &str)]) -> String {
    let items: String = categories
        .iter()
        .map(|(name, path)| format!(r#"<li class="level0"><a class="level-top" href="{path}">{name}</a></li>"#))
        .collect();
    format!(r#"<html><body><nav class="navigation"><ul>{items}</ul></nav></body></html>"#)
}

pub fn magento_listing(names: &[&str]) -> String {
    let cards: String = names
        .iter()
        .map(|name| {
            let slug = name.to_lowercase().replace(' ', "-");
            format!(
                r#"<li class="item product product-item"><div class="product-item-info">
  <a class="product-item-link" href="/{slug}.html">{name}</a>
  <div class="price-box"><span class="price">€25,00</span></div>
</div></li>"#
            )
        })
        .collect();
    format!(r#"<html><body><ol class="products list items product-items">{cards}</ol></body></html>"#)
}
