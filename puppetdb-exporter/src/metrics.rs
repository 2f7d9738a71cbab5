//! Gauge registry shared by the scrape loop and the /metrics endpoint.
//!
//! Holds the six fixed collections exposed by the exporter. Every collection
//! is a `prometheus::GaugeVec`, whose cells are atomics, so a scrape of the
//! endpoint never observes a torn value while a cycle is writing.

use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{Encoder, GaugeVec, Opts, TextEncoder};
use std::sync::Arc;
use tracing::warn;

/// The fixed set of gauge collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    ReportStatusCount,
    ReportResources,
    ReportTime,
    ReportChanges,
    ReportEvents,
    Report,
}

impl Collection {
    pub const ALL: [Collection; 6] = [
        Collection::ReportStatusCount,
        Collection::ReportResources,
        Collection::ReportTime,
        Collection::ReportChanges,
        Collection::ReportEvents,
        Collection::Report,
    ];

    fn namespace(self) -> &'static str {
        match self {
            Collection::ReportStatusCount => "puppetdb",
            _ => "puppet",
        }
    }

    fn name(self) -> &'static str {
        match self {
            Collection::ReportStatusCount => "node_report_status_count",
            Collection::ReportResources => "report_resources",
            Collection::ReportTime => "report_time",
            Collection::ReportChanges => "report_changes",
            Collection::ReportEvents => "report_events",
            Collection::Report => "report",
        }
    }

    fn help(self) -> &'static str {
        match self {
            Collection::ReportStatusCount => "Total count of reports status by type",
            Collection::ReportResources => "Total count of resources per status",
            Collection::ReportTime => "Total execution time per resource type",
            Collection::ReportChanges => "Total count of resources changed",
            Collection::ReportEvents => "Total count of resources per event",
            Collection::Report => "Timestamp of latest report",
        }
    }

    /// Label schema, in the order `set` expects values.
    pub fn labels(self) -> &'static [&'static str] {
        match self {
            Collection::ReportStatusCount => &["status"],
            Collection::Report => &["environment", "host", "deactivated"],
            _ => &["name", "environment", "host"],
        }
    }

    /// Fully qualified name as exposed, ex: `puppet_report_time`.
    pub fn metric_name(self) -> String {
        format!("{}_{}", self.namespace(), self.name())
    }
}

#[derive(Clone)]
pub struct MetricRegistry {
    gauges: Arc<Vec<(Collection, GaugeVec)>>,
}

impl MetricRegistry {
    pub fn new() -> Result<Self, prometheus::Error> {
        let mut gauges = Vec::with_capacity(Collection::ALL.len());
        for collection in Collection::ALL {
            let opts = Opts::new(collection.name(), collection.help()).namespace(collection.namespace());
            gauges.push((collection, GaugeVec::new(opts, collection.labels())?));
        }
        Ok(Self { gauges: Arc::new(gauges) })
    }

    fn vec(&self, collection: Collection) -> &GaugeVec {
        // ALL est construit dans l'ordre des variantes
        &self.gauges[collection as usize].1
    }

    /// Overwrites the value of one label tuple. A tuple of the wrong arity is logged and dropped.
    pub fn set(&self, collection: Collection, labels: &[&str], value: f64) {
        match self.vec(collection).get_metric_with_label_values(labels) {
            Ok(gauge) => gauge.set(value),
            Err(e) => warn!(
                "dropping sample for {}: {} (labels {:?})",
                collection.metric_name(),
                e,
                labels
            ),
        }
    }

    /// Reads one sample without creating the series.
    pub fn value(&self, collection: Collection, labels: &[&str]) -> Option<f64> {
        let schema = collection.labels();
        if labels.len() != schema.len() {
            return None;
        }
        self.vec(collection)
            .collect()
            .iter()
            .flat_map(|family| family.get_metric())
            .find(|metric| {
                schema.iter().zip(labels).all(|(name, expected)| {
                    metric
                        .get_label()
                        .iter()
                        .any(|pair| pair.get_name() == *name && pair.get_value() == *expected)
                })
            })
            .map(|metric| metric.get_gauge().get_value())
    }

    /// Number of label tuples currently held by one collection.
    pub fn series_count(&self, collection: Collection) -> usize {
        self.vec(collection)
            .collect()
            .iter()
            .map(|family| family.get_metric().len())
            .sum()
    }

    /// Renders the collections in Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let families = self.collect();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl Collector for MetricRegistry {
    fn desc(&self) -> Vec<&Desc> {
        self.gauges.iter().flat_map(|(_, g)| g.desc()).collect()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        self.gauges
            .iter()
            .flat_map(|(_, g)| g.collect())
            // un GaugeVec vide produit une famille sans métriques
            .filter(|family| !family.get_metric().is_empty())
            .collect()
    }
}
