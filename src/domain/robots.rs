//! robots.txt rule sets
//!
//! Parsing and matching are pure; fetching and caching live in
//! `infrastructure::robots_resolver`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Allow,
    Disallow,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RobotsRule {
    pub kind: RuleKind,
    pub pattern: String,
}

/// Directives applicable to this crawler for one origin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotsRuleSet {
    pub origin: String,
    pub crawler_user_agent_token: String,
    /// Resolved base delay between requests
    pub crawl_delay_ms: u64,
    /// `true` when `crawl_delay_ms` came from a `Crawl-delay` directive
    pub explicit_delay: bool,
    /// Allow and Disallow rules in file order
    pub rules: Vec<RobotsRule>,
    pub fetched_at: DateTime<Utc>,
    pub ttl: Duration,
}

impl RobotsRuleSet {
    /// Parse a robots.txt body.
    ///
    /// `default_delay_ms` is used when no applicable `Crawl-delay` exists.
    pub fn parse(
        origin: &str,
        content: &str,
        crawler_token: &str,
        default_delay_ms: u64,
        ttl: Duration,
    ) -> Self {
        let mut rules = Vec::new();
        let mut explicit_delay_ms = None;
        let mut applicable = false;
        let mut in_agent_lines = false;

        for raw_line in content.lines() {
            let line = raw_line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let Some((field, value)) = line.split_once(':') else {
                continue;
            };
            let field = field.trim().to_ascii_lowercase();
            let value = value.trim();

            if field == "user-agent" {
                // Consecutive User-agent lines share one group
                if !in_agent_lines {
                    applicable = false;
                }
                in_agent_lines = true;
                applicable |= agent_applies(value, crawler_token);
                continue;
            }
            in_agent_lines = false;

            if !applicable {
                continue;
            }
            match field.as_str() {
                "disallow" if !value.is_empty() => rules.push(RobotsRule {
                    kind: RuleKind::Disallow,
                    pattern: value.to_string(),
                }),
                "allow" if !value.is_empty() => rules.push(RobotsRule {
                    kind: RuleKind::Allow,
                    pattern: value.to_string(),
                }),
                "crawl-delay" => {
                    if let Ok(seconds) = value.parse::<f64>() {
                        if seconds.is_finite() && seconds >= 0.0 {
                            explicit_delay_ms = Some((seconds * 1000.0).round() as u64);
                        }
                    }
                }
                _ => {}
            }
        }

        Self {
            origin: origin.to_string(),
            crawler_user_agent_token: crawler_token.to_string(),
            crawl_delay_ms: explicit_delay_ms.unwrap_or(default_delay_ms),
            explicit_delay: explicit_delay_ms.is_some(),
            rules,
            fetched_at: Utc::now(),
            ttl,
        }
    }

    /// Rule set that allows everything, used when robots.txt is unavailable
    pub fn permissive(origin: &str, crawler_token: &str, delay_ms: u64, ttl: Duration) -> Self {
        Self {
            origin: origin.to_string(),
            crawler_user_agent_token: crawler_token.to_string(),
            crawl_delay_ms: delay_ms,
            explicit_delay: false,
            rules: Vec::new(),
            fetched_at: Utc::now(),
            ttl,
        }
    }

    /// Whether this crawler may fetch `url`.
    ///
    /// Rules are evaluated in file order and the last matching rule decides.
    pub fn is_allowed(&self, url: &str) -> bool {
        let (path, full) = match Url::parse(url) {
            Ok(parsed) => {
                let mut path = parsed.path().to_string();
                if let Some(query) = parsed.query() {
                    path.push('?');
                    path.push_str(query);
                }
                (path, url.to_string())
            }
            Err(_) => (url.to_string(), url.to_string()),
        };

        let mut allowed = true;
        for rule in &self.rules {
            if pattern_matches(&rule.pattern, &path, &full) {
                allowed = rule.kind == RuleKind::Allow;
            }
        }
        allowed
    }

    pub fn disallow_patterns(&self) -> impl Iterator<Item = &str> {
        self.patterns(RuleKind::Disallow)
    }

    pub fn allow_patterns(&self) -> impl Iterator<Item = &str> {
        self.patterns(RuleKind::Allow)
    }

    fn patterns(&self, kind: RuleKind) -> impl Iterator<Item = &str> {
        self.rules
            .iter()
            .filter(move |rule| rule.kind == kind)
            .map(|rule| rule.pattern.as_str())
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::days(365));
        now - self.fetched_at >= ttl
    }
}

/// `*` or case-insensitive containment in either direction
fn agent_applies(agent: &str, crawler_token: &str) -> bool {
    let agent = agent.trim().to_lowercase();
    if agent == "*" {
        return true;
    }
    let token = crawler_token.trim().to_lowercase();
    if agent.is_empty() || token.is_empty() {
        return false;
    }
    agent.contains(&token) || token.contains(&agent)
}

fn pattern_matches(pattern: &str, path: &str, full_url: &str) -> bool {
    if pattern.contains('*') {
        let anchored_end = pattern.ends_with('$');
        let body = pattern.trim_end_matches('$');
        let expr = body
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        let expr = if anchored_end {
            format!("^{expr}$")
        } else {
            format!("^{expr}")
        };
        return Regex::new(&expr).is_ok_and(|re| re.is_match(path));
    }
    if pattern.ends_with('/') {
        return path.starts_with(pattern);
    }
    if pattern.contains('?') {
        return full_url.contains(pattern);
    }
    path == pattern || path.starts_with(pattern)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const DAY: Duration = Duration::from_secs(86_400);

    fn rules(content: &str) -> RobotsRuleSet {
        RobotsRuleSet::parse("https://seeds.test", content, "SeedHarvester", 2000, DAY)
    }

    #[test]
    fn collects_only_applicable_groups() {
        let set = rules(
            "# comment\n\
             User-agent: Googlebot\n\
             Disallow: /google-only/\n\
             \n\
             User-agent: *\n\
             Disallow: /cart/\n\
             Allow: /cart/public\n\
             Crawl-delay: 4\n",
        );
        assert_eq!(set.disallow_patterns().collect::<Vec<_>>(), vec!["/cart/"]);
        assert_eq!(set.allow_patterns().collect::<Vec<_>>(), vec!["/cart/public"]);
        assert_eq!(set.crawl_delay_ms, 4000);
        assert!(set.explicit_delay);
    }

    #[test]
    fn agent_match_is_bidirectional_substring() {
        assert!(agent_applies("seedharvester/1.0", "SeedHarvester"));
        assert!(agent_applies("Seed", "SeedHarvester"));
        assert!(!agent_applies("Bingbot", "SeedHarvester"));
    }

    #[test]
    fn consecutive_agent_lines_share_a_group() {
        let set = rules(
            "User-agent: Bingbot\n\
             User-agent: SeedHarvester\n\
             Disallow: /private/\n",
        );
        assert!(!set.is_allowed("https://seeds.test/private/stock"));
    }

    #[test]
    fn last_matching_rule_wins() {
        let set = rules(
            "User-agent: *\n\
             Allow: /shop/feminized/\n\
             Disallow: /shop/\n",
        );
        // A more specific Allow earlier in the file loses to a later Disallow
        assert!(!set.is_allowed("https://seeds.test/shop/feminized/page/2/"));

        let set = rules(
            "User-agent: *\n\
             Disallow: /shop/\n\
             Allow: /shop/feminized/\n",
        );
        assert!(set.is_allowed("https://seeds.test/shop/feminized/page/2/"));
        assert!(!set.is_allowed("https://seeds.test/shop/autos/"));
    }

    #[rstest]
    #[case("/*.pdf$", "https://seeds.test/docs/menu.pdf", false)]
    #[case("/*.pdf$", "https://seeds.test/docs/menu.pdf.html", true)]
    #[case("/*/reviews", "https://seeds.test/p/amnesia/reviews", false)]
    #[case("/checkout/", "https://seeds.test/checkout/step-1", false)]
    #[case("/checkout/", "https://seeds.test/checkout", true)]
    #[case("?add-to-cart=", "https://seeds.test/shop/?add-to-cart=42", false)]
    #[case("/my-account", "https://seeds.test/my-account-settings", false)]
    #[case("/my-account", "https://seeds.test/shop", true)]
    fn pattern_forms(#[case] pattern: &str, #[case] url: &str, #[case] allowed: bool) {
        let set = rules(&format!("User-agent: *\nDisallow: {pattern}\n"));
        assert_eq!(set.is_allowed(url), allowed, "{pattern} vs {url}");
    }

    #[test]
    fn empty_disallow_allows_everything() {
        let set = rules("User-agent: *\nDisallow:\n");
        assert!(set.rules.is_empty());
        assert!(set.is_allowed("https://seeds.test/anything"));
        assert_eq!(set.crawl_delay_ms, 2000);
        assert!(!set.explicit_delay);
    }

    #[test]
    fn expiry_follows_ttl() {
        let set = rules("");
        assert!(!set.is_expired(set.fetched_at + chrono::Duration::hours(23)));
        assert!(set.is_expired(set.fetched_at + chrono::Duration::hours(24)));
    }
}
