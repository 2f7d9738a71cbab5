//! PuppetDB exporter library
//!
//! Polls PuppetDB for node and report state and turns each batch into a
//! snapshot of Prometheus gauges:
//! - `puppetdb_node_report_status_count{status}`
//! - `puppet_report_{resources,time,changes,events}{name,environment,host}`
//! - `puppet_report{environment,host,deactivated}`

pub mod aggregator;
pub mod config;
pub mod health;
pub mod http;
pub mod metrics;
pub mod models;
pub mod puppetdb;
pub mod scrape;

pub use aggregator::{Aggregator, CycleSummary, StatusTally, UNREPORTED};
pub use config::{ConfigError, ExporterConfig};
pub use health::ScrapeHealth;
pub use metrics::{Collection, MetricRegistry};
pub use models::{NodeRecord, ReportMetricRecord};
pub use puppetdb::{PuppetDb, PuppetDbClient, PuppetDbError};
pub use scrape::ScrapeLoop;
