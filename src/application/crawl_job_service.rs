//! Job plumbing around the orchestrator
//!
//! `run_job` marks the seller running, crawls, persists every harvested
//! record under its category, remembers a detected page count, touches the
//! seller with the final status and appends an audit entry. Persistence is
//! per-record idempotent, so a cancelled or aborted job still saves what it
//! harvested.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use futures::future::join_all;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::crawl_orchestrator::CrawlOrchestrator;
use super::site_adapter::SiteAdapter;
use crate::domain::errors::CrawlError;
use crate::domain::job::{CrawlJobConfig, CrawlMode, JobResult};
use crate::domain::repositories::{CatalogPersistence, JobActivity, SellerStatus, UpsertSummary};
use crate::infrastructure::robots_resolver::RobotsPolicyResolver;

/// Failures listed in the audit entry before it is cut short
const MAX_PERSISTENCE_FAILURES_LOGGED: usize = 10;

/// Outcome of one job: crawl result plus what persistence did with it
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub job_id: String,
    pub seller_id: i64,
    pub result: JobResult,
    pub persistence: UpsertSummary,
}

impl JobReport {
    /// Crawl errors plus records that failed to persist
    pub fn total_errors(&self) -> u32 {
        self.result.error_count + self.persistence.errors
    }
}

/// A job together with the adapter for its site
#[derive(Clone)]
pub struct ScheduledJob {
    pub config: CrawlJobConfig,
    pub adapter: Arc<dyn SiteAdapter>,
}

pub struct CrawlJobService {
    orchestrator: Arc<CrawlOrchestrator>,
    persistence: Arc<dyn CatalogPersistence>,
}

impl CrawlJobService {
    pub fn new(orchestrator: Arc<CrawlOrchestrator>, persistence: Arc<dyn CatalogPersistence>) -> Self {
        Self {
            orchestrator,
            persistence,
        }
    }

    /// Crawl, persist and audit one job.
    ///
    /// Fails only on invalid configuration or when the database cannot be
    /// written at all; page, card and record failures are counted in the
    /// report instead.
    pub async fn run_job(
        &self,
        config: CrawlJobConfig,
        adapter: &dyn SiteAdapter,
        cancel: &CancellationToken,
    ) -> Result<JobReport> {
        config.validate()?;
        let job_id = Uuid::new_v4().to_string();
        let seller_id = self
            .persistence
            .upsert_seller(&config.seller, SellerStatus::Running)
            .await?;

        let config = self.with_remembered_page_count(config, seller_id).await?;
        info!(
            job_id = %job_id,
            seller = %config.seller.name,
            mode = %config.mode,
            fallback_max_pages = ?config.fallback_max_pages,
            "📋 Crawl job accepted"
        );

        let result = self.orchestrator.run(&config, adapter, cancel).await;
        let persistence = self.persist(seller_id, &result).await?;

        if config.mode == CrawlMode::AutoDiscover {
            if let Some(max_pages) = result.detected_max_pages {
                self.persistence.remember_max_pages(seller_id, max_pages).await?;
            }
        }

        let status = if result.is_completed() {
            SellerStatus::Completed
        } else {
            SellerStatus::Failed
        };
        self.persistence.touch_seller(seller_id, status).await?;

        let activity = JobActivity {
            job_id: job_id.clone(),
            seller_id,
            status,
            mode: config.mode,
            pages_visited: result.pages_visited,
            success_count: result.success_count,
            error_count: result.error_count + persistence.errors,
            saved_count: persistence.saved,
            updated_count: persistence.updated,
            duration_ms: result.duration_ms,
            error_detail: error_detail(&result, &persistence),
        };
        self.persistence.log_job_activity(&activity).await?;

        info!(
            job_id = %job_id,
            seller = %config.seller.name,
            %status,
            pages = result.pages_visited,
            records = result.success_count,
            errors = activity.error_count,
            saved = persistence.saved,
            updated = persistence.updated,
            duration_ms = result.duration_ms,
            "🏁 Crawl job finished"
        );

        Ok(JobReport {
            job_id,
            seller_id,
            result,
            persistence,
        })
    }

    /// Run several jobs, one sequential lane per origin.
    ///
    /// Lanes run concurrently; reports come back in input order.
    pub async fn run_many(&self, jobs: Vec<ScheduledJob>, cancel: &CancellationToken) -> Vec<Result<JobReport>> {
        let total = jobs.len();
        let mut lanes: BTreeMap<String, Vec<(usize, ScheduledJob)>> = BTreeMap::new();
        for (index, job) in jobs.into_iter().enumerate() {
            let origin = RobotsPolicyResolver::origin_of(&job.config.scraping_source_url)
                .unwrap_or_else(|| job.config.scraping_source_url.clone());
            lanes.entry(origin).or_default().push((index, job));
        }
        info!(jobs = total, origins = lanes.len(), "Running crawl jobs");

        let lane_runs = lanes.into_iter().map(|(origin, lane)| async move {
            let mut reports = Vec::with_capacity(lane.len());
            for (index, job) in lane {
                if cancel.is_cancelled() {
                    warn!(origin = %origin, seller = %job.config.seller.name, "Skipping job after cancellation");
                    reports.push((index, Err(CrawlError::Cancelled.into())));
                    continue;
                }
                let report = self.run_job(job.config, job.adapter.as_ref(), cancel).await;
                if let Err(e) = &report {
                    error!(origin = %origin, error = %e, "❌ Crawl job failed");
                }
                reports.push((index, report));
            }
            reports
        });

        let mut indexed: Vec<(usize, Result<JobReport>)> = join_all(lane_runs).await.into_iter().flatten().collect();
        indexed.sort_by_key(|(index, _)| *index);
        indexed.into_iter().map(|(_, report)| report).collect()
    }

    /// Use the page count remembered from an earlier run when the caller gave none
    async fn with_remembered_page_count(&self, config: CrawlJobConfig, seller_id: i64) -> Result<CrawlJobConfig> {
        if config.fallback_max_pages.is_some() {
            return Ok(config);
        }
        Ok(match self.persistence.last_known_max_pages(seller_id).await? {
            Some(pages) => config.with_fallback_max_pages(pages),
            None => config,
        })
    }

    async fn persist(&self, seller_id: i64, result: &JobResult) -> Result<UpsertSummary> {
        let mut summary = UpsertSummary::default();
        for category in &result.categories {
            let records: Vec<_> = result.records_for(category).cloned().collect();
            if records.is_empty() {
                continue;
            }
            let category_id = self.persistence.upsert_category(seller_id, category).await?;
            summary.merge(self.persistence.upsert_products(category_id, &records).await?);
        }
        if summary.errors > 0 {
            warn!(seller_id, failed = summary.errors, "⚠️ Some records could not be persisted");
        }
        Ok(summary)
    }
}

fn error_detail(result: &JobResult, persistence: &UpsertSummary) -> Option<String> {
    let mut parts: Vec<String> = result.error_summary().into_iter().collect();
    parts.extend(
        persistence
            .failures
            .iter()
            .take(MAX_PERSISTENCE_FAILURES_LOGGED)
            .map(|e| format!("[{}] {e}", e.kind())),
    );
    if persistence.failures.len() > MAX_PERSISTENCE_FAILURES_LOGGED {
        parts.push(format!(
            "... and {} more persistence failures",
            persistence.failures.len() - MAX_PERSISTENCE_FAILURES_LOGGED
        ));
    }
    (!parts.is_empty()).then(|| parts.join("\n"))
}
