//! Pagination domain logic centralization.
//!
//! Every adapter only reports what a page *says* about pagination
//! ([`PaginationSignal`]); whether another page gets fetched is decided here,
//! once, for all sites:
//! - an explicit range (Test / ManualRange with an end page) always wins over
//!   anything detected on the page
//! - otherwise the max-page count seen on the branch's first page is adopted,
//!   for AutoDiscover and for a ManualRange given only a start page
//! - without an explicit end, an end-of-catalog marker or an empty page stops
//!   the branch immediately
//! - with neither range nor detection, the caller's fallback bound applies,
//!   otherwise the branch stops after its first page

use serde::{Deserialize, Serialize};

use super::job::CrawlJobConfig;

/// What a listing page reveals about pagination
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationSignal {
    /// Highest page number visible in the pagination widget
    pub max_pages: Option<u32>,
    /// Site-specific "no more products" marker
    pub end_of_catalog: bool,
}

impl PaginationSignal {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_max_pages(max_pages: u32) -> Self {
        Self {
            max_pages: Some(max_pages),
            end_of_catalog: false,
        }
    }

    pub fn end_of_catalog() -> Self {
        Self {
            max_pages: None,
            end_of_catalog: true,
        }
    }
}

/// What happened on the page that was just processed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageOutcome {
    pub page: u32,
    /// Cards found on the page, before job-wide dedup
    pub records_found: usize,
    pub signal: PaginationSignal,
    /// Fetch exhausted its retries; nothing was extracted
    pub failed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    RangeExhausted,
    MaxPagesReached,
    EndOfCatalog,
    PaginationUndetected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    Continue { next_page: u32 },
    Stop(StopReason),
}

/// Page bounds for one frontier branch (one category)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchPlan {
    first_page: u32,
    explicit_end: Option<u32>,
    fallback_max: Option<u32>,
    detected_max: Option<u32>,
}

impl BranchPlan {
    pub fn for_job(config: &CrawlJobConfig) -> Self {
        Self {
            first_page: config.first_page(),
            explicit_end: config.explicit_end_page(),
            fallback_max: config.fallback_max_pages,
            detected_max: None,
        }
    }

    pub fn first_page(&self) -> u32 {
        self.first_page
    }

    pub fn detected_max(&self) -> Option<u32> {
        self.detected_max
    }

    /// Decide whether the branch fetches another page after `outcome`
    pub fn decide(&mut self, outcome: &PageOutcome) -> Continuation {
        if let Some(end) = self.explicit_end {
            return if outcome.page < end {
                Continuation::Continue {
                    next_page: outcome.page + 1,
                }
            } else {
                Continuation::Stop(StopReason::RangeExhausted)
            };
        }

        if !outcome.failed && (outcome.signal.end_of_catalog || outcome.records_found == 0) {
            return Continuation::Stop(StopReason::EndOfCatalog);
        }

        // Without an explicit end, the first page's count bounds the branch
        if outcome.page == self.first_page {
            if let Some(max) = outcome.signal.max_pages {
                self.detected_max = Some(max);
            }
        }

        match self.detected_max.or(self.fallback_max) {
            Some(bound) if outcome.page < bound => Continuation::Continue {
                next_page: outcome.page + 1,
            },
            Some(_) => Continuation::Stop(StopReason::MaxPagesReached),
            None => Continuation::Stop(StopReason::PaginationUndetected),
        }
    }
}
