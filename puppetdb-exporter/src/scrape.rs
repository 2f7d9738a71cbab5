//! Scrape loop: fetch -> aggregate -> sleep, one cycle at a time.
//!
//! The sleep starts once a cycle is finished, so the effective period is
//! processing time + interval. Shutdown is only observed between cycles.

use crate::aggregator::{Aggregator, CycleSummary};
use crate::config::{parse_duration, ConfigError};
use crate::health::ScrapeHealth;
use crate::metrics::MetricRegistry;
use crate::puppetdb::PuppetDb;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::watch;
use tracing::info;

pub struct ScrapeLoop<C> {
    aggregator: Aggregator<C>,
    interval: Duration,
    health: ScrapeHealth,
}

impl<C: PuppetDb> ScrapeLoop<C> {
    /// Fails when `unreported_node` is not a valid duration; the loop never
    /// starts with an undefined threshold.
    pub fn new(
        client: Arc<C>,
        metrics: MetricRegistry,
        interval: Duration,
        unreported_node: &str,
    ) -> Result<Self, ConfigError> {
        let threshold = parse_duration("unreported_node", unreported_node)?;
        Ok(Self {
            aggregator: Aggregator::new(client, metrics, threshold),
            interval,
            health: ScrapeHealth::new(),
        })
    }

    pub fn with_reset_stale_statuses(mut self, enabled: bool) -> Self {
        self.aggregator = self.aggregator.with_reset_stale_statuses(enabled);
        self
    }

    pub fn with_health(mut self, health: ScrapeHealth) -> Self {
        self.health = health;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub async fn run_once(&mut self) -> CycleSummary {
        let summary = self.aggregator.run_cycle(OffsetDateTime::now_utc()).await;
        self.health.record(OffsetDateTime::now_utc(), &summary);
        summary
    }

    /// Runs until `shutdown` turns `true` (or its sender is dropped).
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("scrape loop started (interval {:?})", self.interval);
        while !*shutdown.borrow() {
            self.run_once().await;
            if wait_or_shutdown(self.interval, &mut shutdown).await {
                break;
            }
        }
        info!("scrape loop stopped");
    }
}

/// Sleeps for `interval`; returns `true` if shutdown was requested meanwhile.
async fn wait_or_shutdown(interval: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    let sleep = tokio::time::sleep(interval);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return false,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return true;
                }
            }
        }
    }
}
