//! Per-origin robots.txt resolution with a TTL cache
//!
//! The cache is owned by the resolver instance, not the process, so jobs that
//! share an `Arc<RobotsPolicyResolver>` share robots state and tests get a
//! fresh one. Concurrent misses for the same origin may both fetch; the last
//! writer wins.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

use crate::domain::robots::RobotsRuleSet;
use crate::infrastructure::delay_planner::DelayPlanner;
use crate::infrastructure::http_client::DocumentFetcher;

pub struct RobotsPolicyResolver {
    fetcher: Arc<dyn DocumentFetcher>,
    planner: DelayPlanner,
    robots_token: String,
    ttl: Duration,
    cache: RwLock<HashMap<String, RobotsRuleSet>>,
}

impl RobotsPolicyResolver {
    pub fn new(
        fetcher: Arc<dyn DocumentFetcher>,
        planner: DelayPlanner,
        robots_token: &str,
        ttl: Duration,
    ) -> Self {
        Self {
            fetcher,
            planner,
            robots_token: robots_token.to_string(),
            ttl,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// `scheme://host[:port]` of `url`
    pub fn origin_of(url: &str) -> Option<String> {
        let parsed = Url::parse(url).ok()?;
        parsed.host_str()?;
        Some(parsed.origin().ascii_serialization())
    }

    /// Rule set for `origin`, fetched on a cache miss or expiry.
    ///
    /// Never fails: an unreachable or non-2xx robots.txt yields a permissive
    /// rule set.
    pub async fn resolve(&self, origin: &str) -> RobotsRuleSet {
        {
            let cache = self.cache.read().await;
            if let Some(rules) = cache.get(origin) {
                if !rules.is_expired(Utc::now()) {
                    return rules.clone();
                }
                debug!(origin, "robots.txt cache entry expired");
            }
        }

        let rules = self.fetch_rules(origin).await;
        self.cache
            .write()
            .await
            .insert(origin.to_string(), rules.clone());
        rules
    }

    async fn fetch_rules(&self, origin: &str) -> RobotsRuleSet {
        let robots_url = format!("{}/robots.txt", origin.trim_end_matches('/'));
        let default_delay = self.planner.jittered_delay_ms();

        match self.fetcher.fetch(&robots_url).await {
            Ok(document) if document.is_success() => {
                let rules = RobotsRuleSet::parse(
                    origin,
                    &document.body,
                    &self.robots_token,
                    default_delay,
                    self.ttl,
                );
                info!(
                    origin,
                    rules = rules.rules.len(),
                    crawl_delay_ms = rules.crawl_delay_ms,
                    explicit_delay = rules.explicit_delay,
                    "🤖 robots.txt loaded"
                );
                rules
            }
            Ok(document) => {
                warn!(
                    origin,
                    status = document.status,
                    "robots.txt unavailable, allowing all"
                );
                RobotsRuleSet::permissive(origin, &self.robots_token, default_delay, self.ttl)
            }
            Err(e) => {
                warn!(origin, error = %e, "Failed to fetch robots.txt, allowing all");
                RobotsRuleSet::permissive(origin, &self.robots_token, default_delay, self.ttl)
            }
        }
    }

    /// Whether rules for `url`'s origin are cached and unexpired, so a
    /// robots check issues no request
    pub async fn is_fresh(&self, url: &str) -> bool {
        let Some(origin) = Self::origin_of(url) else {
            return true;
        };
        self.cache
            .read()
            .await
            .get(&origin)
            .is_some_and(|rules| !rules.is_expired(Utc::now()))
    }

    /// Whether this crawler may fetch `url`; unparseable URLs are allowed
    pub async fn is_allowed(&self, url: &str) -> bool {
        let Some(origin) = Self::origin_of(url) else {
            return true;
        };
        self.resolve(&origin).await.is_allowed(url)
    }

    /// Base delay before the next request to `url`'s origin.
    ///
    /// Explicit `Crawl-delay` when present, otherwise a fresh jittered value.
    pub async fn delay_for(&self, url: &str) -> u64 {
        let Some(origin) = Self::origin_of(url) else {
            return self.planner.jittered_delay_ms();
        };
        let rules = self.resolve(&origin).await;
        if rules.explicit_delay {
            rules.crawl_delay_ms
        } else {
            self.planner.jittered_delay_ms()
        }
    }

    /// Drop every cached entry
    pub async fn clear(&self) {
        self.cache.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::config::PolitenessConfig;
    use crate::infrastructure::http_client::{FetchError, FetchedDocument};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Serves a fixed robots.txt response and counts requests
    struct RobotsServer {
        response: Result<FetchedDocument, FetchError>,
        requests: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl DocumentFetcher for RobotsServer {
        async fn fetch(&self, url: &str) -> Result<FetchedDocument, FetchError> {
            self.requests.lock().unwrap().push(url.to_string());
            self.response.clone()
        }
    }

    fn resolver(response: Result<FetchedDocument, FetchError>) -> (Arc<RobotsServer>, RobotsPolicyResolver) {
        let server = Arc::new(RobotsServer {
            response,
            requests: Mutex::new(Vec::new()),
        });
        let resolver = RobotsPolicyResolver::new(
            server.clone(),
            DelayPlanner::new(&PolitenessConfig::default()),
            "SeedHarvester",
            Duration::from_secs(86_400),
        );
        (server, resolver)
    }

    #[test]
    fn origin_keeps_scheme_host_and_port() {
        assert_eq!(
            RobotsPolicyResolver::origin_of("https://seeds.test:8443/shop/page/2/?x=1").as_deref(),
            Some("https://seeds.test:8443")
        );
        assert_eq!(RobotsPolicyResolver::origin_of("not a url"), None);
    }

    #[tokio::test]
    async fn rules_are_cached_per_origin() {
        let body = "User-agent: *\nDisallow: /cart/\nCrawl-delay: 7\n";
        let (server, resolver) = resolver(Ok(FetchedDocument::ok("https://seeds.test/robots.txt", body)));

        assert!(!resolver.is_allowed("https://seeds.test/cart/").await);
        assert!(resolver.is_allowed("https://seeds.test/shop/").await);
        assert_eq!(resolver.delay_for("https://seeds.test/shop/").await, 7000);

        let requests = server.requests.lock().unwrap().clone();
        assert_eq!(requests, vec!["https://seeds.test/robots.txt".to_string()]);
    }

    #[tokio::test]
    async fn freshness_tracks_cached_origins() {
        let (_, resolver) = resolver(Ok(FetchedDocument::with_status("https://seeds.test/robots.txt", 404)));
        assert!(!resolver.is_fresh("https://seeds.test/shop/").await);
        resolver.is_allowed("https://seeds.test/shop/").await;
        assert!(resolver.is_fresh("https://seeds.test/shop/page/2/").await);
        assert!(!resolver.is_fresh("https://other.test/").await);
        assert!(resolver.is_fresh("not a url").await);

        resolver.clear().await;
        assert!(!resolver.is_fresh("https://seeds.test/shop/").await);
    }

    #[tokio::test]
    async fn missing_robots_is_permissive_with_jittered_delay() {
        let (_, resolver) = resolver(Ok(FetchedDocument::with_status(
            "https://seeds.test/robots.txt",
            404,
        )));
        assert!(resolver.is_allowed("https://seeds.test/anything").await);
        let delay = resolver.delay_for("https://seeds.test/anything").await;
        assert!((2000..=5000).contains(&delay));
    }

    #[tokio::test]
    async fn network_failure_is_permissive() {
        let (_, resolver) = resolver(Err(FetchError::Network {
            url: "https://seeds.test/robots.txt".to_string(),
            reason: "connection refused".to_string(),
        }));
        let rules = resolver.resolve("https://seeds.test").await;
        assert!(rules.rules.is_empty());
        assert!(!rules.explicit_delay);
    }
}
