use crate::aggregator::CycleSummary;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

#[derive(Debug, Serialize)]
pub struct ScrapeHealthView {
    pub uptime_seconds: u64,
    pub cycles: u64,
    pub node_fetch_failures: u64,
    pub last_cycle_at: Option<String>, // RFC3339
    pub last_cycle: Option<CycleSummary>,
}

/// Scrape loop bookkeeping, read by `GET /health/scrape`.
#[derive(Clone)]
pub struct ScrapeHealth {
    start_time: Instant,
    cycles: Arc<AtomicU64>,
    node_fetch_failures: Arc<AtomicU64>,
    last: Arc<Mutex<Option<(OffsetDateTime, CycleSummary)>>>,
}

impl ScrapeHealth {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            cycles: Arc::new(AtomicU64::new(0)),
            node_fetch_failures: Arc::new(AtomicU64::new(0)),
            last: Arc::new(Mutex::new(None)),
        }
    }

    pub fn record(&self, finished_at: OffsetDateTime, summary: &CycleSummary) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        if summary.node_fetch_failed {
            self.node_fetch_failures.fetch_add(1, Ordering::Relaxed);
        }
        *self.last.lock() = Some((finished_at, summary.clone()));
    }

    pub fn get_health(&self) -> ScrapeHealthView {
        let last = self.last.lock().clone();
        ScrapeHealthView {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            cycles: self.cycles.load(Ordering::Relaxed),
            node_fetch_failures: self.node_fetch_failures.load(Ordering::Relaxed),
            last_cycle_at: last.as_ref().and_then(|(at, _)| at.format(&Rfc3339).ok()),
            last_cycle: last.map(|(_, summary)| summary),
        }
    }
}

impl Default for ScrapeHealth {
    fn default() -> Self {
        Self::new()
    }
}
