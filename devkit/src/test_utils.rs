/*!
Harness de cycle de scrape

Assemble un `MockPuppetDb`, un `MetricRegistry` neuf et un `Aggregator`
avec une horloge figée, puis expose des lectures typées des gauges.
*/

use crate::puppetdb_stub::MockPuppetDb;
use puppetdb_exporter::{Aggregator, Collection, CycleSummary, MetricRegistry};
use std::sync::Arc;
use std::time::Duration;
use time::macros::datetime;
use time::OffsetDateTime;

/// Seuil par défaut de l'exporter (2h)
pub const DEFAULT_THRESHOLD: Duration = Duration::from_secs(2 * 3600);

pub struct TestHarness {
    pub puppetdb: MockPuppetDb,
    pub metrics: MetricRegistry,
    aggregator: Aggregator<MockPuppetDb>,
    now: OffsetDateTime,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_threshold(DEFAULT_THRESHOLD)
    }

    pub fn with_threshold(threshold: Duration) -> Self {
        tracing_subscriber::fmt().with_test_writer().try_init().ok();

        let puppetdb = MockPuppetDb::new();
        let metrics = MetricRegistry::new().expect("gauge creation failed");
        let aggregator = Aggregator::new(Arc::new(puppetdb.clone()), metrics.clone(), threshold);

        Self { puppetdb, metrics, aggregator, now: datetime!(2024-01-01 01:00:00 UTC) }
    }

    /// Fige l'horloge utilisée par les prochains cycles
    pub fn at(mut self, now: OffsetDateTime) -> Self {
        self.now = now;
        self
    }

    pub fn set_now(&mut self, now: OffsetDateTime) {
        self.now = now;
    }

    pub fn now(&self) -> OffsetDateTime {
        self.now
    }

    /// Les statuts absents d'un cycle gardent leur dernière valeur
    pub fn with_sticky_statuses(mut self) -> Self {
        self.aggregator = self.aggregator.with_reset_stale_statuses(false);
        self
    }

    pub async fn run_cycle(&mut self) -> CycleSummary {
        self.aggregator.run_cycle(self.now).await
    }

    pub fn status_count(&self, status: &str) -> Option<f64> {
        self.metrics.value(Collection::ReportStatusCount, &[status])
    }

    pub fn report_timestamp(&self, environment: &str, host: &str, deactivated: bool) -> Option<f64> {
        let deactivated = if deactivated { "true" } else { "false" };
        self.metrics.value(Collection::Report, &[environment, host, deactivated])
    }

    pub fn report_metric(&self, collection: Collection, name: &str, environment: &str, host: &str) -> Option<f64> {
        self.metrics.value(collection, &[name, environment, host])
    }

    pub fn series_count(&self, collection: Collection) -> usize {
        self.metrics.series_count(collection)
    }

    /// Exposition texte complète, pour comparer deux cycles
    pub fn snapshot(&self) -> String {
        match self.metrics.encode() {
            Ok(text) => text,
            Err(e) => panic!("encoding failed: {}", e),
        }
    }

    pub fn assert_status(&self, status: &str, expected: f64) {
        assert_eq!(
            self.status_count(status),
            Some(expected),
            "status {} count mismatch",
            status
        );
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
