//! Snapshot aggregator: one fetched batch of nodes -> one set of gauge updates.
//!
//! Per node:
//! - `puppet_report{environment,host,deactivated}` = Unix seconds of the latest report
//! - one status credit (its own status, or "unreported" when it has none / never reported)
//! - one extra "unreported" credit when the latest report is older than the threshold
//! - `puppet_report_{resources,time,changes,events}` from the report metrics
//!
//! Errors are contained: a bad timestamp or a failed report-metrics fetch only
//! affects the node concerned, a failed node list fetch only affects the cycle.

use crate::metrics::{Collection, MetricRegistry};
use crate::models::{NodeRecord, ReportMetricRecord};
use crate::puppetdb::PuppetDb;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};
use tracing::{debug, error, info, warn};

pub const UNREPORTED: &str = "unreported";

/// Report metric categories that map onto a gauge collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportCategory {
    Resources,
    Time,
    Changes,
    Events,
}

impl ReportCategory {
    /// `None` for any category outside the fixed set, so PuppetDB data can
    /// never address `node_report_status_count` or `report`.
    pub fn from_category(category: &str) -> Option<Self> {
        match category {
            "resources" => Some(Self::Resources),
            "time" => Some(Self::Time),
            "changes" => Some(Self::Changes),
            "events" => Some(Self::Events),
            _ => None,
        }
    }

    pub fn collection(self) -> Collection {
        match self {
            Self::Resources => Collection::ReportResources,
            Self::Time => Collection::ReportTime,
            Self::Changes => Collection::ReportChanges,
            Self::Events => Collection::ReportEvents,
        }
    }
}

/// `config_retrieval` -> `Config Retrieval`. Display label only, not an identifier.
pub fn normalize_metric_name(raw: &str) -> String {
    raw.replace('_', " ")
        .split(' ')
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Parses `2024-01-01T00:00:00Z`. Fractional seconds are accepted and dropped.
pub fn parse_report_timestamp(raw: &str) -> Result<OffsetDateTime, time::error::Parse> {
    let whole = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]Z");
    let fractional = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]Z");

    PrimitiveDateTime::parse(raw, whole)
        .or_else(|_| PrimitiveDateTime::parse(raw, fractional))
        .map(|dt| dt.replace_nanosecond(0).unwrap_or(dt).assume_utc())
}

/// Per-cycle count of nodes per status name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct StatusTally(BTreeMap<String, u64>);

impl StatusTally {
    pub fn credit(&mut self, status: &str) {
        *self.0.entry(status.to_string()).or_insert(0) += 1;
    }

    pub fn get(&self, status: &str) -> u64 {
        self.0.get(status).copied().unwrap_or(0)
    }

    pub fn contains(&self, status: &str) -> bool {
        self.0.contains_key(status)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Outcome of one cycle, logged and fed to the health tracker.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleSummary {
    pub nodes: usize,
    pub never_reported: usize,
    pub stale: usize,
    pub timestamp_errors: usize,
    pub report_metric_errors: usize,
    pub skipped_categories: usize,
    pub node_fetch_failed: bool,
    pub statuses: StatusTally,
    pub duration_ms: u64,
}

pub struct Aggregator<C> {
    client: Arc<C>,
    metrics: MetricRegistry,
    unreported_threshold: time::Duration,
    reset_stale_statuses: bool,
    known_statuses: BTreeSet<String>,
}

impl<C: PuppetDb> Aggregator<C> {
    pub fn new(client: Arc<C>, metrics: MetricRegistry, unreported_threshold: std::time::Duration) -> Self {
        Self {
            client,
            metrics,
            // au-delà de i64 secondes : jamais périmé
            unreported_threshold: time::Duration::try_from(unreported_threshold).unwrap_or(time::Duration::MAX),
            reset_stale_statuses: true,
            known_statuses: BTreeSet::new(),
        }
    }

    /// When enabled, statuses published by an earlier cycle but absent from
    /// the current one are set back to 0 instead of keeping their last count.
    pub fn with_reset_stale_statuses(mut self, enabled: bool) -> Self {
        self.reset_stale_statuses = enabled;
        self
    }

    pub fn metrics(&self) -> &MetricRegistry {
        &self.metrics
    }

    /// Fetches the node list and aggregates it. A fetch failure leaves every
    /// published gauge untouched.
    pub async fn run_cycle(&mut self, now: OffsetDateTime) -> CycleSummary {
        let started = Instant::now();
        let mut summary = match self.client.nodes().await {
            Ok(nodes) => self.aggregate(&nodes, now).await,
            Err(e) => {
                error!("failed to get nodes: {}", e);
                CycleSummary { node_fetch_failed: true, ..Default::default() }
            }
        };
        summary.duration_ms = started.elapsed().as_millis() as u64;

        info!(
            "scrape cycle done in {}ms: {} nodes, {} never reported, {} stale, {} timestamp errors, {} report metric errors, statuses {:?}",
            summary.duration_ms,
            summary.nodes,
            summary.never_reported,
            summary.stale,
            summary.timestamp_errors,
            summary.report_metric_errors,
            summary.statuses
        );
        summary
    }

    /// Aggregates an already fetched batch, then flushes the status tally.
    pub async fn aggregate(&mut self, nodes: &[NodeRecord], now: OffsetDateTime) -> CycleSummary {
        let mut summary = CycleSummary { nodes: nodes.len(), ..Default::default() };
        let mut tally = StatusTally::default();

        for node in nodes {
            self.process_node(node, now, &mut tally, &mut summary).await;
        }

        self.flush(&tally);
        summary.statuses = tally;
        summary
    }

    async fn process_node(
        &self,
        node: &NodeRecord,
        now: OffsetDateTime,
        tally: &mut StatusTally,
        summary: &mut CycleSummary,
    ) {
        if node.report_timestamp.is_empty() {
            tally.credit(UNREPORTED);
            summary.never_reported += 1;
            return;
        }

        let latest_report = match parse_report_timestamp(&node.report_timestamp) {
            Ok(ts) => ts,
            Err(e) => {
                warn!(
                    "failed to parse report timestamp {:?} of {}: {}",
                    node.report_timestamp, node.certname, e
                );
                summary.timestamp_errors += 1;
                return;
            }
        };

        let env = node.report_environment.as_str();
        let host = node.certname.as_str();

        self.metrics.set(
            Collection::Report,
            &[env, host, node.deactivated_label()],
            latest_report.unix_timestamp() as f64,
        );

        // les deux crédits "unreported" sont cumulatifs
        let is_stale = latest_report
            .checked_add(self.unreported_threshold)
            .is_some_and(|deadline| deadline < now);
        if is_stale {
            tally.credit(UNREPORTED);
            summary.stale += 1;
        }

        if node.latest_report_status.is_empty() {
            tally.credit(UNREPORTED);
        } else {
            tally.credit(&node.latest_report_status);
        }

        if node.latest_report_hash.is_empty() {
            return;
        }

        match self.client.report_metrics(&node.latest_report_hash).await {
            Ok(records) => {
                summary.skipped_categories += self.publish_report_metrics(&records, env, host);
            }
            Err(e) => {
                warn!(
                    "failed to get report metrics {} of {}: {}",
                    node.latest_report_hash, node.certname, e
                );
                summary.report_metric_errors += 1;
            }
        }
    }

    /// Returns how many records were skipped for an unknown category.
    fn publish_report_metrics(&self, records: &[ReportMetricRecord], env: &str, host: &str) -> usize {
        let mut skipped = 0;
        for record in records {
            let Some(category) = ReportCategory::from_category(&record.category) else {
                debug!("skipping report metric {}/{} of {}", record.category, record.name, host);
                skipped += 1;
                continue;
            };
            let name = normalize_metric_name(&record.name);
            self.metrics.set(category.collection(), &[name.as_str(), env, host], record.value);
        }
        skipped
    }

    fn flush(&mut self, tally: &StatusTally) {
        if self.reset_stale_statuses {
            for status in self.known_statuses.iter().filter(|s| !tally.contains(s)) {
                self.metrics.set(Collection::ReportStatusCount, &[status.as_str()], 0.0);
            }
        }
        for (status, count) in tally.iter() {
            self.metrics.set(Collection::ReportStatusCount, &[status], count as f64);
            self.known_statuses.insert(status.to_string());
        }
    }
}
