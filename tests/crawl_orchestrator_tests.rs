//! Crawl orchestrator behaviour against an in-memory storefront
//!
//! All tests run on tokio's paused clock, so politeness waits complete
//! instantly while request instants still reflect the virtual delays.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use common::{
    FakeSite, Reply, job, magento_homepage, magento_listing, orchestrator, politeness, woo_cards, woo_empty_page,
    woo_malformed_card, woo_page, woo_url,
};
use seed_harvester::application::adapters::{MagentoAdapter, WooCommerceAdapter};
use seed_harvester::domain::{CrawlError, CrawlMode, CrawlState};

fn woo() -> WooCommerceAdapter {
    WooCommerceAdapter::new().unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_mode_two_page_fixture() {
    let mut first = woo_cards("Haze", 23);
    first.insert(7, woo_malformed_card());
    let site = Arc::new(
        FakeSite::new()
            .page(&woo_url(1), woo_page(&first, Some(2)))
            .page(&woo_url(2), woo_page(&woo_cards("Kush", 10), Some(2))),
    );

    let result = orchestrator(&site, &politeness(2000, 5000))
        .run(
            &job("Woo Seeds", &woo_url(1), CrawlMode::Test).with_range(1, 2),
            &woo(),
            &CancellationToken::new(),
        )
        .await;

    assert!(result.is_completed());
    assert_eq!(result.success_count, 33);
    assert_eq!(result.error_count, 1);
    assert_eq!(result.pages_visited, 2);
    assert!(matches!(
        result.errors[0],
        CrawlError::ExtractionFieldError { page: 1, index: 7, .. }
    ));

    let record = &result.records[0];
    assert_eq!(record.canonical_url, "https://woo.test/product/haze-1");
    assert_eq!(record.image_url.as_deref(), Some("https://woo.test/wp-content/uploads/haze-1.jpg"));
    assert_eq!(record.price_variants.len(), 2);
    assert_eq!(record.thc_range.as_ref().and_then(|r| r.max), Some(22.0));
}

#[tokio::test(start_paused = true)]
async fn manual_range_visits_exactly_the_requested_pages() {
    let mut site = FakeSite::new();
    for page in 1..=10 {
        site = site.page(&woo_url(page), woo_page(&woo_cards(&format!("P{page}"), 3), Some(10)));
    }
    let site = Arc::new(site);

    let result = orchestrator(&site, &politeness(2000, 5000))
        .run(
            &job("Woo Seeds", &woo_url(1), CrawlMode::ManualRange).with_range(2, 4),
            &woo(),
            &CancellationToken::new(),
        )
        .await;

    assert!(result.is_completed());
    assert_eq!(site.page_requests(), vec![woo_url(2), woo_url(3), woo_url(4)]);
    assert_eq!(result.success_count, 9);
    assert_eq!(result.detected_max_pages, None);
}

#[tokio::test(start_paused = true)]
async fn end_of_catalog_marker_stops_auto_discovery() {
    let site = Arc::new(
        FakeSite::new()
            .page(&woo_url(1), woo_page(&woo_cards("Haze", 12), Some(5)))
            .page(&woo_url(2), woo_empty_page())
            .page(&woo_url(3), woo_page(&woo_cards("Never", 12), Some(5))),
    );

    let result = orchestrator(&site, &politeness(2000, 5000))
        .run(&job("Woo Seeds", &woo_url(1), CrawlMode::AutoDiscover), &woo(), &CancellationToken::new())
        .await;

    assert!(result.is_completed());
    assert_eq!(site.page_requests(), vec![woo_url(1), woo_url(2)]);
    assert_eq!(result.detected_max_pages, Some(5));
    assert_eq!(result.success_count, 12);
    assert_eq!(result.error_count, 0);
}

#[tokio::test(start_paused = true)]
async fn auto_discovery_follows_first_page_count() {
    let site = Arc::new(
        FakeSite::new()
            .page(&woo_url(1), woo_page(&woo_cards("A", 4), Some(3)))
            .page(&woo_url(2), woo_page(&woo_cards("B", 4), Some(7)))
            .page(&woo_url(3), woo_page(&woo_cards("C", 4), Some(7))),
    );

    let result = orchestrator(&site, &politeness(2000, 5000))
        .run(&job("Woo Seeds", &woo_url(1), CrawlMode::AutoDiscover), &woo(), &CancellationToken::new())
        .await;

    assert_eq!(site.page_requests(), vec![woo_url(1), woo_url(2), woo_url(3)]);
    assert_eq!(result.success_count, 12);
}

#[tokio::test(start_paused = true)]
async fn explicit_crawl_delay_spaces_every_fetch() {
    let site = Arc::new(
        FakeSite::new()
            .page("https://woo.test/robots.txt", "User-agent: *\nCrawl-delay: 7\n")
            .page(&woo_url(1), woo_page(&woo_cards("A", 2), Some(3)))
            .page(&woo_url(2), woo_page(&woo_cards("B", 2), Some(3)))
            .page(&woo_url(3), woo_page(&woo_cards("C", 2), Some(3))),
    );

    orchestrator(&site, &politeness(2000, 5000))
        .run(&job("Woo Seeds", &woo_url(1), CrawlMode::AutoDiscover), &woo(), &CancellationToken::new())
        .await;

    // robots.txt counts as a request to the origin too
    assert_eq!(site.requests()[0], "https://woo.test/robots.txt");
    let times = site.request_times();
    assert_eq!(times.len(), 4);
    for pair in times.windows(2) {
        assert!(pair[1].duration_since(pair[0]) >= Duration::from_secs(7));
    }
}

#[tokio::test(start_paused = true)]
async fn lost_entry_page_still_waits_before_next_job_on_origin() {
    let site = Arc::new(
        FakeSite::new()
            .status("https://woo.test/sale/", 404)
            .page(&woo_url(1), woo_page(&woo_cards("A", 2), None)),
    );
    let orchestrator = orchestrator(&site, &politeness(2000, 2000));

    let lost = orchestrator
        .run(&job("Woo Sale", "https://woo.test/sale/", CrawlMode::Test), &woo(), &CancellationToken::new())
        .await;
    let next = orchestrator
        .run(&job("Woo Seeds", &woo_url(1), CrawlMode::Test), &woo(), &CancellationToken::new())
        .await;

    assert_eq!(lost.final_state, CrawlState::Aborted { reason: "entry url unavailable".into() });
    assert!(next.is_completed());
    assert_eq!(site.page_requests(), vec!["https://woo.test/sale/".to_string(), woo_url(1)]);
    let times = site.page_request_times();
    assert!(times[1].duration_since(times[0]) >= Duration::from_millis(2000));
}

#[tokio::test(start_paused = true)]
async fn unreachable_homepage_waits_before_returning() {
    let site = Arc::new(FakeSite::new().status("https://mage.test/", 404));
    let started = tokio::time::Instant::now();

    orchestrator(&site, &politeness(2000, 2000))
        .run(
            &job("Mage Seeds", "https://mage.test/", CrawlMode::Test),
            &MagentoAdapter::new().unwrap(),
            &CancellationToken::new(),
        )
        .await;

    let homepage = site.page_request_times()[0];
    assert!(tokio::time::Instant::now().duration_since(homepage) >= Duration::from_millis(2000));
    // robots.txt fetch, wait, homepage, wait
    assert!(homepage.duration_since(started) >= Duration::from_millis(2000));
}

#[tokio::test(start_paused = true)]
async fn jittered_delay_stays_within_bounds() {
    let mut site = FakeSite::new();
    for page in 1..=5 {
        site = site.page(&woo_url(page), woo_page(&woo_cards(&format!("P{page}"), 2), Some(5)));
    }
    let site = Arc::new(site);

    orchestrator(&site, &politeness(2000, 5000))
        .run(&job("Woo Seeds", &woo_url(1), CrawlMode::AutoDiscover), &woo(), &CancellationToken::new())
        .await;

    let times = site.page_request_times();
    assert_eq!(times.len(), 5);
    for pair in times.windows(2) {
        let gap = pair[1].duration_since(pair[0]);
        assert!(gap >= Duration::from_millis(2000), "gap {gap:?} below floor");
        // one tick of timer resolution
        assert!(gap <= Duration::from_millis(5001), "gap {gap:?} above ceiling");
    }
}

#[tokio::test(start_paused = true)]
async fn throttled_page_is_retried_with_backoff() {
    let site = Arc::new(FakeSite::new().script(
        &woo_url(1),
        vec![Reply::Status(503), Reply::Body(woo_page(&woo_cards("A", 3), None))],
    ));

    let result = orchestrator(&site, &politeness(2000, 2000))
        .run(&job("Woo Seeds", &woo_url(1), CrawlMode::Test), &woo(), &CancellationToken::new())
        .await;

    assert!(result.is_completed());
    assert_eq!(result.success_count, 3);
    assert_eq!(result.error_count, 0);
    assert_eq!(site.request_count(&woo_url(1)), 2);

    let times = site.page_request_times();
    assert!(times[1].duration_since(times[0]) >= Duration::from_millis(4000));
}

#[tokio::test(start_paused = true)]
async fn timeout_is_retried() {
    let site = Arc::new(FakeSite::new().script(
        &woo_url(1),
        vec![Reply::Timeout, Reply::Body(woo_page(&woo_cards("A", 2), None))],
    ));

    let result = orchestrator(&site, &politeness(2000, 2000))
        .run(&job("Woo Seeds", &woo_url(1), CrawlMode::Test), &woo(), &CancellationToken::new())
        .await;

    assert_eq!(result.success_count, 2);
    assert_eq!(site.request_count(&woo_url(1)), 2);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_skip_the_page_only() {
    let site = Arc::new(
        FakeSite::new()
            .page(&woo_url(1), woo_page(&woo_cards("A", 2), None))
            .status(&woo_url(2), 503)
            .page(&woo_url(3), woo_page(&woo_cards("C", 2), None)),
    );

    let result = orchestrator(&site, &politeness(2000, 2000))
        .run(
            &job("Woo Seeds", &woo_url(1), CrawlMode::ManualRange).with_range(1, 3),
            &woo(),
            &CancellationToken::new(),
        )
        .await;

    assert!(result.is_completed());
    assert_eq!(site.request_count(&woo_url(2)), 3);
    assert_eq!(site.request_count(&woo_url(3)), 1);
    assert_eq!(result.pages_visited, 3);
    assert_eq!(result.success_count, 4);
    assert_eq!(result.error_count, 1);
    assert!(matches!(
        &result.errors[0],
        CrawlError::PageFetchFailed { attempts: 3, status: Some(503), .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn not_found_is_not_retried() {
    let site = Arc::new(
        FakeSite::new()
            .page(&woo_url(1), woo_page(&woo_cards("A", 2), None))
            .page(&woo_url(3), woo_page(&woo_cards("C", 2), None)),
    );

    let result = orchestrator(&site, &politeness(2000, 2000))
        .run(
            &job("Woo Seeds", &woo_url(1), CrawlMode::ManualRange).with_range(1, 3),
            &woo(),
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(site.request_count(&woo_url(2)), 1);
    assert_eq!(result.success_count, 4);
    assert_eq!(result.error_count, 1);
}

#[tokio::test(start_paused = true)]
async fn robots_block_abandons_only_that_category() {
    let site = Arc::new(
        FakeSite::new()
            .page("https://mage.test/robots.txt", "User-agent: SeedHarvester\nDisallow: /feminized\n")
            .page(
                "https://mage.test/",
                magento_homepage(&[("Feminized Seeds", "/feminized-seeds.html"), ("Autoflowering", "/autoflowering.html")]),
            )
            .page("https://mage.test/feminized-seeds.html", magento_listing(&["Never Fetched"]))
            .page("https://mage.test/autoflowering.html", magento_listing(&["Auto One", "Auto Two"])),
    );

    let result = orchestrator(&site, &politeness(2000, 5000))
        .run(
            &job("Mage Seeds", "https://mage.test/", CrawlMode::Test),
            &MagentoAdapter::new().unwrap(),
            &CancellationToken::new(),
        )
        .await;

    assert!(result.is_completed());
    assert_eq!(site.request_count("https://mage.test/feminized-seeds.html"), 0);
    assert_eq!(result.success_count, 2);
    assert_eq!(result.error_count, 1);
    assert!(matches!(&result.errors[0], CrawlError::RobotsBlocked { url } if url.contains("feminized")));
    assert_eq!(result.categories.len(), 2);
    assert!(result.records.iter().all(|r| r.category.slug == "autoflowering"));
}

#[tokio::test(start_paused = true)]
async fn unreachable_homepage_aborts_discovery_job() {
    let site = Arc::new(FakeSite::new().status("https://mage.test/", 500));

    let result = orchestrator(&site, &politeness(2000, 5000))
        .run(
            &job("Mage Seeds", "https://mage.test/", CrawlMode::AutoDiscover),
            &MagentoAdapter::new().unwrap(),
            &CancellationToken::new(),
        )
        .await;

    assert!(matches!(result.final_state, CrawlState::Aborted { .. }));
    assert!(result.records.is_empty());
    assert_eq!(result.error_count, 1);
    assert_eq!(site.request_count("https://mage.test/"), 1);
}

#[tokio::test(start_paused = true)]
async fn cancellation_during_wait_keeps_harvested_records() {
    let mut site = FakeSite::new();
    for page in 1..=3 {
        site = site.page(&woo_url(page), woo_page(&woo_cards(&format!("P{page}"), 5), Some(3)));
    }
    let site = Arc::new(site);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        // after page 1 (robots wait ends at 2s), before page 2 (4s)
        tokio::time::sleep(Duration::from_millis(3000)).await;
        trigger.cancel();
    });

    let result = orchestrator(&site, &politeness(2000, 2000))
        .run(&job("Woo Seeds", &woo_url(1), CrawlMode::AutoDiscover), &woo(), &cancel)
        .await;

    assert_eq!(result.final_state, CrawlState::Aborted { reason: "cancelled".into() });
    assert_eq!(site.page_requests(), vec![woo_url(1)]);
    assert_eq!(result.success_count, 5);
    assert!(result.errors.contains(&CrawlError::Cancelled));
}
