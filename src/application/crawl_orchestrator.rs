//! Crawl orchestrator
//!
//! Drives one crawl job through `Idle -> Discovering -> Fetching ->
//! Extracting -> DecidingContinuation` until the frontier is empty or the job
//! aborts. Exactly one request is in flight per job. Every page cycle, failed
//! or not, and every robots.txt fetch is followed by a politeness wait before
//! the next request is issued.
//!
//! Per-page failures are recorded in the [`JobResult`] and skipped. Only two
//! things end a job early: cancellation, and losing the entry URL (the
//! discovery homepage, or the first listing page when the site has no
//! category navigation).

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::site_adapter::SiteAdapter;
use crate::domain::errors::CrawlError;
use crate::domain::job::{CrawlJobConfig, CrawlState, JobResult, PageFetchState};
use crate::domain::pagination::{BranchPlan, Continuation, PageOutcome, PaginationSignal, StopReason};
use crate::domain::product::{CategoryRef, ProductCardRecord};
use crate::infrastructure::delay_planner::DelayPlanner;
use crate::infrastructure::http_client::{DocumentFetcher, FetchedDocument};
use crate::infrastructure::parsing::ParseContext;
use crate::infrastructure::robots_resolver::RobotsPolicyResolver;

/// Category used for sites without category navigation
pub const DEFAULT_CATEGORY_NAME: &str = "All Products";

/// Result of fetching one URL under the retry policy
struct FetchOutcome {
    state: PageFetchState,
    retry_after: Option<Duration>,
    result: Result<FetchedDocument, CrawlError>,
}

/// How a frontier branch ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BranchEnd {
    Finished,
    Blocked,
    EntryLost,
    Cancelled,
}

/// Mutable bookkeeping of one running job
struct JobRun {
    started: Instant,
    state: CrawlState,
    records: Vec<ProductCardRecord>,
    seen: HashSet<String>,
    categories: Vec<CategoryRef>,
    errors: Vec<CrawlError>,
    pages_visited: u32,
    detected_max_pages: Option<u32>,
}

impl JobRun {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            state: CrawlState::Idle,
            records: Vec::new(),
            seen: HashSet::new(),
            categories: Vec::new(),
            errors: Vec::new(),
            pages_visited: 0,
            detected_max_pages: None,
        }
    }

    fn transition(&mut self, next: CrawlState) {
        debug!(from = ?self.state, to = ?next, "Crawl state transition");
        self.state = next;
    }

    /// Keep records whose canonical URL this job has not produced yet
    fn merge(&mut self, records: Vec<ProductCardRecord>) -> usize {
        let before = self.records.len();
        for record in records {
            if self.seen.insert(record.canonical_url.clone()) {
                self.records.push(record);
            } else {
                debug!(url = %record.canonical_url, "Product already harvested in this job");
            }
        }
        self.records.len() - before
    }

    fn finish(mut self, final_state: CrawlState) -> JobResult {
        self.transition(final_state);
        let error_count = self.errors.iter().filter(|e| e.is_counted()).count();
        JobResult {
            success_count: u32::try_from(self.records.len()).unwrap_or(u32::MAX),
            error_count: u32::try_from(error_count).unwrap_or(u32::MAX),
            records: self.records,
            categories: self.categories,
            pages_visited: self.pages_visited,
            duration_ms: u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX),
            final_state: self.state,
            detected_max_pages: self.detected_max_pages,
            errors: self.errors,
        }
    }
}

pub struct CrawlOrchestrator {
    fetcher: Arc<dyn DocumentFetcher>,
    robots: Arc<RobotsPolicyResolver>,
    planner: DelayPlanner,
}

impl CrawlOrchestrator {
    pub fn new(fetcher: Arc<dyn DocumentFetcher>, robots: Arc<RobotsPolicyResolver>, planner: DelayPlanner) -> Self {
        Self {
            fetcher,
            robots,
            planner,
        }
    }

    /// Run one job to completion, cancellation or abort.
    ///
    /// Never fails: every problem ends up in the returned result.
    pub async fn run(&self, config: &CrawlJobConfig, adapter: &dyn SiteAdapter, cancel: &CancellationToken) -> JobResult {
        let mut run = JobRun::new();
        info!(
            seller = %config.seller.name,
            url = %config.scraping_source_url,
            mode = %config.mode,
            adapter = adapter.name(),
            "🚀 Starting crawl job"
        );

        if let Err(e) = config.validate() {
            warn!(seller = %config.seller.name, error = %e, "Rejecting crawl job");
            let reason = e.to_string();
            run.errors.push(e);
            return run.finish(CrawlState::Aborted { reason });
        }

        run.transition(CrawlState::Discovering);
        let discovering = adapter.supports_discovery();
        let mut frontier: VecDeque<CategoryRef> = if discovering {
            match self.discover(config, adapter, cancel, &mut run).await {
                Ok(categories) => categories.into(),
                Err(end) => return Self::abort(run, end),
            }
        } else {
            VecDeque::from([CategoryRef::new(DEFAULT_CATEGORY_NAME, &config.scraping_source_url)])
        };

        let mut entry_pending = !discovering;
        while let Some(category) = frontier.pop_front() {
            info!(seller = %config.seller.name, category = %category.name, remaining = frontier.len(), "📂 Crawling category");
            run.categories.push(category.clone());

            let end = self
                .crawl_branch(config, adapter, &category, entry_pending, cancel, &mut run)
                .await;
            entry_pending = false;

            match end {
                BranchEnd::Finished | BranchEnd::Blocked => {}
                BranchEnd::EntryLost | BranchEnd::Cancelled => return Self::abort(run, end),
            }
        }

        info!(
            seller = %config.seller.name,
            pages = run.pages_visited,
            records = run.records.len(),
            errors = run.errors.len(),
            "✅ Crawl job completed"
        );
        run.finish(CrawlState::Completed)
    }

    fn abort(mut run: JobRun, end: BranchEnd) -> JobResult {
        let reason = match end {
            BranchEnd::Cancelled => {
                run.errors.push(CrawlError::Cancelled);
                "cancelled".to_string()
            }
            _ => "entry url unavailable".to_string(),
        };
        warn!(reason = %reason, pages = run.pages_visited, records = run.records.len(), "🛑 Crawl job aborted");
        run.finish(CrawlState::Aborted { reason })
    }

    /// Fetch the homepage and turn its navigation into frontier branches
    async fn discover(
        &self,
        config: &CrawlJobConfig,
        adapter: &dyn SiteAdapter,
        cancel: &CancellationToken,
        run: &mut JobRun,
    ) -> Result<Vec<CategoryRef>, BranchEnd> {
        let url = config.scraping_source_url.as_str();
        if cancel.is_cancelled() {
            return Err(BranchEnd::Cancelled);
        }
        if !self.robots_allow(url, cancel).await? {
            warn!(url, "🤖 Homepage disallowed by robots.txt");
            run.errors.push(CrawlError::RobotsBlocked { url: url.to_string() });
            return Err(BranchEnd::EntryLost);
        }

        let outcome = self.fetch_with_retries(url, 0, cancel).await;
        run.pages_visited += 1;
        let (last_status, retry_after) = (outcome.state.last_status, outcome.retry_after);
        let categories = match outcome.result {
            Ok(document) => adapter.discover_category_links(&document.body, &document.final_url),
            Err(CrawlError::Cancelled) => return Err(BranchEnd::Cancelled),
            Err(e) => {
                warn!(url, error = %e, "Homepage unavailable, no categories to crawl");
                run.errors.push(e);
                self.politeness_wait(url, last_status, retry_after, cancel).await?;
                return Err(BranchEnd::EntryLost);
            }
        };

        self.politeness_wait(url, last_status, retry_after, cancel).await?;

        if categories.is_empty() {
            warn!(url, "No category links found, crawling the source url as one category");
            return Ok(vec![CategoryRef::new(DEFAULT_CATEGORY_NAME, url)]);
        }
        info!(url, categories = categories.len(), "🧭 Categories discovered");
        Ok(categories)
    }

    /// Crawl one category until its plan says stop
    async fn crawl_branch(
        &self,
        config: &CrawlJobConfig,
        adapter: &dyn SiteAdapter,
        category: &CategoryRef,
        is_entry: bool,
        cancel: &CancellationToken,
        run: &mut JobRun,
    ) -> BranchEnd {
        let mut plan = BranchPlan::for_job(config);
        let mut page = plan.first_page();

        let end = loop {
            if cancel.is_cancelled() {
                break BranchEnd::Cancelled;
            }

            let url = adapter.build_page_url(&category.url, page);
            run.transition(CrawlState::Fetching { page });

            let allowed = match self.robots_allow(&url, cancel).await {
                Ok(allowed) => allowed,
                Err(end) => break end,
            };
            if !allowed {
                warn!(url = %url, page, category = %category.name, "🤖 Disallowed by robots.txt, abandoning branch");
                run.errors.push(CrawlError::RobotsBlocked { url });
                break BranchEnd::Blocked;
            }

            let fetched = self.fetch_with_retries(&url, page, cancel).await;
            run.pages_visited += 1;
            let (last_status, retry_after) = (fetched.state.last_status, fetched.retry_after);

            let outcome = match fetched.result {
                Ok(document) => {
                    run.transition(CrawlState::Extracting { page });
                    let context = ParseContext::new(page, &document.final_url, category.clone());
                    let extracted = adapter.extract_products(&document.body, &context);
                    let cards_seen = extracted.cards_seen;
                    let added = run.merge(extracted.records);
                    run.errors.extend(extracted.skipped);
                    info!(
                        url = %url,
                        page,
                        cards = cards_seen,
                        new_records = added,
                        max_pages = ?extracted.signal.max_pages,
                        end_of_catalog = extracted.signal.end_of_catalog,
                        "📄 Listing page processed"
                    );
                    PageOutcome {
                        page,
                        records_found: cards_seen,
                        signal: extracted.signal,
                        failed: false,
                    }
                }
                Err(CrawlError::Cancelled) => break BranchEnd::Cancelled,
                Err(e) => {
                    warn!(url = %url, page, error = %e, "⚠️ Skipping page");
                    run.errors.push(e);
                    if is_entry && page == plan.first_page() {
                        break match self.politeness_wait(&url, last_status, retry_after, cancel).await {
                            Ok(()) => BranchEnd::EntryLost,
                            Err(end) => end,
                        };
                    }
                    PageOutcome {
                        page,
                        records_found: 0,
                        signal: PaginationSignal::none(),
                        failed: true,
                    }
                }
            };

            if let Err(end) = self.politeness_wait(&url, last_status, retry_after, cancel).await {
                break end;
            }

            run.transition(CrawlState::DecidingContinuation { page });
            match plan.decide(&outcome) {
                Continuation::Continue { next_page } => page = next_page,
                Continuation::Stop(reason) => {
                    debug!(category = %category.name, page, ?reason, "Branch finished");
                    if reason == StopReason::PaginationUndetected {
                        warn!(url = %category.url, page, "No page count detected, stopping branch");
                        run.errors.push(CrawlError::PaginationUndetected {
                            url: category.url.clone(),
                            page,
                        });
                    }
                    break BranchEnd::Finished;
                }
            }
        };

        if let Some(max) = plan.detected_max() {
            run.detected_max_pages = Some(run.detected_max_pages.map_or(max, |current| current.max(max)));
        }
        end
    }

    /// Fetch `url`, retrying throttled and transient failures with backoff
    async fn fetch_with_retries(&self, url: &str, page: u32, cancel: &CancellationToken) -> FetchOutcome {
        let mut state = PageFetchState::new(url, page);

        loop {
            state.attempt_count += 1;
            info!(url, page, attempt = state.attempt_count, "🌐 Fetching");

            let (transport_error, retry_after, reason) = match self.fetcher.fetch(url).await {
                Ok(document) if document.is_success() => {
                    state.last_status = Some(document.status);
                    return FetchOutcome {
                        state,
                        retry_after: document.retry_after,
                        result: Ok(document),
                    };
                }
                Ok(document) => {
                    warn!(url, status = document.status, attempt = state.attempt_count, "HTTP error status");
                    state.last_status = Some(document.status);
                    (None, document.retry_after, format!("HTTP {}", document.status))
                }
                Err(e) => {
                    warn!(url, attempt = state.attempt_count, error = %e, "Fetch failed");
                    state.last_status = None;
                    let reason = e.to_string();
                    (Some(e), None, reason)
                }
            };

            if !self.planner.should_retry(&state, transport_error.as_ref()) {
                let error = CrawlError::PageFetchFailed {
                    url: url.to_string(),
                    attempts: state.attempt_count,
                    status: state.last_status,
                    reason,
                };
                return FetchOutcome {
                    state,
                    retry_after,
                    result: Err(error),
                };
            }

            let base = self.robots.delay_for(url).await;
            let backoff = DelayPlanner::backoff_ms(base, state.last_status, retry_after);
            debug!(url, backoff_ms = backoff, status = ?state.last_status, "🔄 Retrying after backoff");
            if !self.planner.wait(backoff, cancel).await {
                return FetchOutcome {
                    state,
                    retry_after,
                    result: Err(CrawlError::Cancelled),
                };
            }
        }
    }

    /// Robots verdict for `url`. When the check had to fetch robots.txt, the
    /// origin's delay runs before the caller's next request.
    async fn robots_allow(&self, url: &str, cancel: &CancellationToken) -> Result<bool, BranchEnd> {
        let fetches_robots = !self.robots.is_fresh(url).await;
        let allowed = self.robots.is_allowed(url).await;
        if fetches_robots {
            self.politeness_wait(url, None, None, cancel).await?;
        }
        Ok(allowed)
    }

    /// Wait the resolved delay for `url`'s origin, scaled by the last status
    async fn politeness_wait(
        &self,
        url: &str,
        last_status: Option<u16>,
        retry_after: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<(), BranchEnd> {
        let base = self.robots.delay_for(url).await;
        let delay = DelayPlanner::backoff_ms(base, last_status, retry_after);
        if self.planner.wait(delay, cancel).await {
            Ok(())
        } else {
            Err(BranchEnd::Cancelled)
        }
    }
}
