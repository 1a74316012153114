//! Shared health state for the /health endpoint.
//! Updated by the scraper after every product scrape.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Scrape counters. Written by `Scraper`, read by the API.
#[derive(Default)]
pub struct HealthState {
    pub scrapes_ok: AtomicU64,
    pub scrapes_failed: AtomicU64,
    /// Times a rejected session had to be regenerated.
    pub session_regenerations: AtomicU64,
    /// Unix ms of the last successful scrape (0 = none).
    pub last_scrape_at_ms: AtomicI64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, at_ms: i64) {
        self.scrapes_ok.fetch_add(1, Ordering::Relaxed);
        self.last_scrape_at_ms.store(at_ms, Ordering::Relaxed);
    }

    /// Counted whether or not the retry that follows succeeds.
    pub fn record_regeneration(&self) {
        self.session_regenerations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.scrapes_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn scrapes_ok(&self) -> u64 {
        self.scrapes_ok.load(Ordering::Relaxed)
    }

    pub fn scrapes_failed(&self) -> u64 {
        self.scrapes_failed.load(Ordering::Relaxed)
    }

    pub fn session_regenerations(&self) -> u64 {
        self.session_regenerations.load(Ordering::Relaxed)
    }

    pub fn last_scrape_at_ms(&self) -> i64 {
        self.last_scrape_at_ms.load(Ordering::Relaxed)
    }
}
