use serde::Deserialize;

/// Normalized reporting state of one managed host.
///
/// Empty strings carry meaning: an empty `report_timestamp` means the node
/// never reported, an empty `latest_report_hash` means no report metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeRecord {
    pub certname: String,
    pub deactivated: String,
    pub report_environment: String,
    pub report_timestamp: String,
    pub latest_report_status: String,
    pub latest_report_hash: String,
}

impl NodeRecord {
    pub fn is_deactivated(&self) -> bool {
        !self.deactivated.is_empty()
    }

    /// Label value for the `deactivated` label of `puppet_report`.
    pub fn deactivated_label(&self) -> &'static str {
        if self.is_deactivated() { "true" } else { "false" }
    }
}

/// One measurement attached to a report (`resources/total = 42.0`).
#[derive(Debug, Clone, PartialEq)]
pub struct ReportMetricRecord {
    pub category: String,
    pub name: String,
    pub value: f64,
}

// Payloads PuppetDB (/pdb/query/v4) - null partout où la valeur est absente
#[derive(Debug, Deserialize)]
pub struct NodeIn {
    pub certname: String,
    pub deactivated: Option<String>,
    pub report_environment: Option<String>,
    pub report_timestamp: Option<String>,
    pub latest_report_status: Option<String>,
    pub latest_report_hash: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReportMetricIn {
    pub category: String,
    pub name: String,
    pub value: f64,
}

impl From<NodeIn> for NodeRecord {
    fn from(n: NodeIn) -> Self {
        Self {
            certname: n.certname,
            deactivated: n.deactivated.unwrap_or_default(),
            report_environment: n.report_environment.unwrap_or_default(),
            report_timestamp: n.report_timestamp.unwrap_or_default(),
            latest_report_status: n.latest_report_status.unwrap_or_default(),
            latest_report_hash: n.latest_report_hash.unwrap_or_default(),
        }
    }
}

impl From<ReportMetricIn> for ReportMetricRecord {
    fn from(m: ReportMetricIn) -> Self {
        Self { category: m.category, name: m.name, value: m.value }
    }
}
