//! Seed Harvester command line
//!
//! `run` crawls one configured seller, `run-all` crawls every configured
//! seller (one sequential lane per origin) and `sites` lists the
//! configuration. Ctrl-C cancels running jobs at the next page boundary.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use seed_harvester::application::{CrawlJobService, CrawlOrchestrator, JobReport, ScheduledJob, SiteKind};
use seed_harvester::domain::{CrawlJobConfig, CrawlMode, SellerIdentity};
use seed_harvester::infrastructure::config::{AppConfig, SiteEntry};
use seed_harvester::infrastructure::{
    DatabaseConnection, DelayPlanner, DocumentFetcher, HttpClient, HttpClientConfig, RobotsPolicyResolver,
    SqliteCatalogRepository, init_logging_with_config,
};

#[derive(Parser)]
#[command(author, version, about = "Polite product catalog crawler for seed banks")]
struct Cli {
    /// TOML configuration file (defaults to config/default.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print job reports as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Crawl one configured seller
    Run {
        /// Seller name as configured under [[sites]]
        #[arg(long)]
        seller: String,
        /// auto, manual or test
        #[arg(long, default_value = "auto")]
        mode: CrawlMode,
        #[arg(long)]
        start: Option<u32>,
        #[arg(long)]
        end: Option<u32>,
        /// Page bound used when no page count is detected
        #[arg(long)]
        fallback_max_pages: Option<u32>,
    },
    /// Crawl every configured seller
    RunAll {
        #[arg(long, default_value = "auto")]
        mode: CrawlMode,
    },
    /// List configured sellers
    Sites,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    init_logging_with_config(&config.logging)?;

    match cli.command {
        Command::Sites => {
            for site in &config.sites {
                println!("{:<24} {:<12} {}", site.seller, site.adapter, site.source_url);
            }
            if config.sites.is_empty() {
                println!("No sites configured");
            }
        }
        Command::Run {
            seller,
            mode,
            start,
            end,
            fallback_max_pages,
        } => {
            let site = config
                .site(&seller)
                .with_context(|| format!("Seller '{seller}' is not configured"))?;
            let mut job = job_for(site, mode);
            job.start_page = start;
            job.end_page = end;
            job.fallback_max_pages = fallback_max_pages;
            let adapter = site.adapter.parse::<SiteKind>()?.adapter()?;

            let service = build_service(&config).await?;
            let cancel = cancel_on_ctrl_c();
            let report = service.run_job(job, adapter.as_ref(), &cancel).await?;
            print_report(&site.seller, &report, cli.json)?;
        }
        Command::RunAll { mode } => {
            let mut jobs = Vec::with_capacity(config.sites.len());
            for site in &config.sites {
                jobs.push(ScheduledJob {
                    config: job_for(site, mode),
                    adapter: site.adapter.parse::<SiteKind>()?.adapter()?,
                });
            }

            let service = build_service(&config).await?;
            let cancel = cancel_on_ctrl_c();
            let reports = service.run_many(jobs, &cancel).await;
            for (site, report) in config.sites.iter().zip(reports) {
                match report {
                    Ok(report) => print_report(&site.seller, &report, cli.json)?,
                    Err(e) => println!("{}: failed: {e:#}", site.seller),
                }
            }
        }
    }

    Ok(())
}

fn job_for(site: &SiteEntry, mode: CrawlMode) -> CrawlJobConfig {
    let seller = SellerIdentity {
        name: site.seller.clone(),
        base_url: site.base_url(),
    };
    CrawlJobConfig::new(seller, &site.source_url, mode)
}

async fn build_service(config: &AppConfig) -> Result<CrawlJobService> {
    let client = HttpClient::with_config(HttpClientConfig::from_crawler_config(&config.crawler))?;
    let fetcher: Arc<dyn DocumentFetcher> = Arc::new(client);
    let planner = DelayPlanner::new(&config.politeness);
    let robots = Arc::new(RobotsPolicyResolver::new(
        fetcher.clone(),
        planner.clone(),
        &config.crawler.robots_token,
        config.politeness.robots_cache_ttl(),
    ));
    let orchestrator = Arc::new(CrawlOrchestrator::new(fetcher, robots, planner));

    let database = DatabaseConnection::new(&config.database.url, config.database.max_connections).await?;
    database.migrate().await?;
    let repository = Arc::new(SqliteCatalogRepository::new(database.pool().clone()));

    info!("✅ Crawl services initialized");
    Ok(CrawlJobService::new(orchestrator, repository))
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("🛑 Interrupt received, stopping at the next page boundary");
            token.cancel();
        }
    });
    cancel
}

fn print_report(seller: &str, report: &JobReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(report)?);
        return Ok(());
    }
    let result = &report.result;
    println!(
        "{seller}: {:?} | pages {} | products {} | errors {} | saved {} | updated {} | {} ms",
        result.final_state,
        result.pages_visited,
        result.success_count,
        report.total_errors(),
        report.persistence.saved,
        report.persistence.updated,
        result.duration_ms,
    );
    Ok(())
}
