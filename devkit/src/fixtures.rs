/*!
Builders de records PuppetDB

Construit des `NodeRecord` lisibles dans les tests et parse des payloads
JSON `/v4/nodes` réels via les types wire de l'exporter.
*/

use anyhow::{Context, Result};
use puppetdb_exporter::models::{NodeIn, ReportMetricIn};
use puppetdb_exporter::{NodeRecord, ReportMetricRecord};
use time::macros::format_description;
use time::OffsetDateTime;

/// Builder pour un node PuppetDB (par défaut : jamais reporté, actif)
#[derive(Debug, Clone)]
pub struct NodeBuilder {
    record: NodeRecord,
}

impl NodeBuilder {
    pub fn new(certname: &str) -> Self {
        Self {
            record: NodeRecord {
                certname: certname.to_string(),
                report_environment: "production".to_string(),
                ..NodeRecord::default()
            },
        }
    }

    pub fn environment(mut self, environment: &str) -> Self {
        self.record.report_environment = environment.to_string();
        self
    }

    /// Timestamp brut, tel que PuppetDB le renverrait
    pub fn reported(mut self, raw: &str) -> Self {
        self.record.report_timestamp = raw.to_string();
        self
    }

    pub fn reported_at(self, at: OffsetDateTime) -> Self {
        let raw = format_timestamp(at);
        self.reported(&raw)
    }

    pub fn status(mut self, status: &str) -> Self {
        self.record.latest_report_status = status.to_string();
        self
    }

    pub fn report_hash(mut self, hash: &str) -> Self {
        self.record.latest_report_hash = hash.to_string();
        self
    }

    pub fn deactivated(mut self, at: &str) -> Self {
        self.record.deactivated = at.to_string();
        self
    }

    pub fn build(self) -> NodeRecord {
        self.record
    }
}

pub fn metric(category: &str, name: &str, value: f64) -> ReportMetricRecord {
    ReportMetricRecord { category: category.to_string(), name: name.to_string(), value }
}

/// Format PuppetDB : `2024-01-01T00:00:00Z`
pub fn format_timestamp(at: OffsetDateTime) -> String {
    let format = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]Z");
    at.to_offset(time::UtcOffset::UTC)
        .format(format)
        .unwrap_or_default()
}

pub fn nodes_from_puppetdb_json(raw: &str) -> Result<Vec<NodeRecord>> {
    let nodes: Vec<NodeIn> = serde_json::from_str(raw).context("invalid /v4/nodes payload")?;
    Ok(nodes.into_iter().map(NodeRecord::from).collect())
}

pub fn report_metrics_from_puppetdb_json(raw: &str) -> Result<Vec<ReportMetricRecord>> {
    let metrics: Vec<ReportMetricIn> =
        serde_json::from_str(raw).context("invalid /v4/reports/<hash>/metrics payload")?;
    Ok(metrics.into_iter().map(ReportMetricRecord::from).collect())
}
