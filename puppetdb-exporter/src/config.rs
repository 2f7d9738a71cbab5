use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::fs;
use tracing::{info, warn};

pub const CONFIG_PATH_ENV: &str = "PUPPETDB_EXPORTER_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "puppetdb-exporter.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("invalid config file {path:?}: {source}")]
    Parse { path: PathBuf, source: serde_yaml::Error },
    #[error("invalid duration for {field} ({value:?}): {source}")]
    Duration { field: &'static str, value: String, source: humantime::DurationError },
    #[error("invalid listen address {0:?}")]
    ListenAddress(String),
    #[error("invalid boolean for {field}: {value:?}")]
    Bool { field: &'static str, value: String },
    #[error("cert_file and key_file must be set together")]
    IncompleteIdentity,
    #[error("metrics_path must start with '/' and not shadow /health: {0:?}")]
    MetricsPath(String),
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ExporterConfig {
    pub puppetdb_url: String,
    pub cert_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
    pub ca_file: Option<PathBuf>,
    pub ssl_skip_verify: bool,
    pub scrape_interval: String,   // humantime, ex: "5s"
    pub unreported_node: String,   // humantime, ex: "2h"
    pub listen_address: String,
    pub metrics_path: String,
    pub request_timeout: String,
    pub reset_stale_statuses: bool,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            puppetdb_url: "https://puppetdb:8081/pdb/query".into(),
            cert_file: None,
            key_file: None,
            ca_file: None,
            ssl_skip_verify: false,
            scrape_interval: "5s".into(),
            unreported_node: "2h".into(),
            listen_address: "0.0.0.0:9635".into(),
            metrics_path: "/metrics".into(),
            request_timeout: "30s".into(),
            reset_stale_statuses: true,
        }
    }
}

impl ExporterConfig {
    pub fn scrape_interval(&self) -> Result<Duration, ConfigError> {
        parse_duration("scrape_interval", &self.scrape_interval)
    }

    pub fn unreported_threshold(&self) -> Result<Duration, ConfigError> {
        parse_duration("unreported_node", &self.unreported_node)
    }

    pub fn request_timeout(&self) -> Result<Duration, ConfigError> {
        parse_duration("request_timeout", &self.request_timeout)
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen_address
            .parse()
            .map_err(|_| ConfigError::ListenAddress(self.listen_address.clone()))
    }

    /// Checks every derived value once, so startup fails before anything is spawned.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scrape_interval()?;
        self.unreported_threshold()?;
        self.request_timeout()?;
        self.listen_addr()?;
        if self.cert_file.is_some() != self.key_file.is_some() {
            return Err(ConfigError::IncompleteIdentity);
        }
        if !self.metrics_path.starts_with('/') || matches!(self.metrics_path.as_str(), "/" | "/health" | "/health/scrape") {
            return Err(ConfigError::MetricsPath(self.metrics_path.clone()));
        }
        Ok(())
    }

    /// Applies `PUPPETDB_*` overrides from a lookup function (the process env in `load_config`).
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("PUPPETDB_URL") { self.puppetdb_url = v; }
        if let Some(v) = lookup("PUPPETDB_CERT_FILE") { self.cert_file = Some(v.into()); }
        if let Some(v) = lookup("PUPPETDB_KEY_FILE") { self.key_file = Some(v.into()); }
        if let Some(v) = lookup("PUPPETDB_CA_FILE") { self.ca_file = Some(v.into()); }
        if let Some(v) = lookup("PUPPETDB_SSL_SKIP_VERIFY") {
            self.ssl_skip_verify = parse_bool("ssl_skip_verify", &v)?;
        }
        if let Some(v) = lookup("PUPPETDB_SCRAPE_INTERVAL") { self.scrape_interval = v; }
        if let Some(v) = lookup("PUPPETDB_UNREPORTED_NODE") { self.unreported_node = v; }
        if let Some(v) = lookup("PUPPETDB_EXPORTER_LISTEN_ADDRESS") { self.listen_address = v; }
        if let Some(v) = lookup("PUPPETDB_EXPORTER_METRICS_PATH") { self.metrics_path = v; }
        if let Some(v) = lookup("PUPPETDB_REQUEST_TIMEOUT") { self.request_timeout = v; }
        if let Some(v) = lookup("PUPPETDB_RESET_STALE_STATUSES") {
            self.reset_stale_statuses = parse_bool("reset_stale_statuses", &v)?;
        }
        Ok(())
    }
}

/// humantime syntax, plus decimal quantities per unit (`1.5h`, `0.5m`, `2.5s`).
pub fn parse_duration(field: &'static str, value: &str) -> Result<Duration, ConfigError> {
    let trimmed = value.trim();
    humantime::parse_duration(trimmed)
        .or_else(|source| parse_decimal_units(trimmed).ok_or(source))
        .map_err(|source| ConfigError::Duration {
            field,
            value: value.to_string(),
            source,
        })
}

// séquence de <nombre décimal><unité>, ex: "1.5h", "1h0.5m"
fn parse_decimal_units(value: &str) -> Option<Duration> {
    if value.is_empty() {
        return None;
    }
    let is_number = |c: char| c.is_ascii_digit() || c == '.';
    let mut rest = value;
    let mut total = 0f64;
    while !rest.is_empty() {
        let number_end = rest.find(|c: char| !is_number(c)).unwrap_or(rest.len());
        let number: f64 = rest[..number_end].parse().ok()?;
        rest = &rest[number_end..];

        let unit_end = rest.find(is_number).unwrap_or(rest.len());
        let unit_secs = match &rest[..unit_end] {
            "h" => 3600.0,
            "m" => 60.0,
            "s" => 1.0,
            "ms" => 1e-3,
            "us" | "µs" => 1e-6,
            "ns" => 1e-9,
            _ => return None,
        };
        total += number * unit_secs;
        rest = &rest[unit_end..];
    }
    Duration::try_from_secs_f64(total).ok()
}

fn parse_bool(field: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Bool { field, value: value.to_string() }),
    }
}

/// Reads the YAML file if present. Missing or blank file means defaults.
pub async fn load_config_file(path: &Path) -> Result<ExporterConfig, ConfigError> {
    if !path.exists() {
        info!("no config file at {:?}, using defaults", path);
        return Ok(ExporterConfig::default());
    }
    let txt = fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
    if txt.trim().is_empty() {
        warn!("config file {:?} is empty, using defaults", path);
        return Ok(ExporterConfig::default());
    }
    serde_yaml::from_str(&txt).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
}

pub async fn load_config() -> Result<ExporterConfig, ConfigError> {
    let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
    let mut cfg = load_config_file(Path::new(&path)).await?;
    cfg.apply_env(|key| std::env::var(key).ok())?;
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = ExporterConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.scrape_interval().unwrap(), Duration::from_secs(5));
        assert_eq!(cfg.unreported_threshold().unwrap(), Duration::from_secs(7200));
        assert_eq!(cfg.listen_addr().unwrap().port(), 9635);
    }

    #[test]
    fn test_compact_durations() {
        assert_eq!(parse_duration("x", "1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("x", "90s").unwrap(), Duration::from_secs(90));
        assert!(matches!(
            parse_duration("unreported_node", "two hours"),
            Err(ConfigError::Duration { field: "unreported_node", .. })
        ));
    }

    #[test]
    fn test_decimal_durations() {
        assert_eq!(parse_duration("x", "1.5h").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("x", "0.5m").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("x", "1h0.5m").unwrap(), Duration::from_secs(3630));
        assert_eq!(parse_duration("x", "2.5s").unwrap(), Duration::from_millis(2500));
        assert!(parse_duration("x", "1.5").is_err());
        assert!(parse_duration("x", "1.5d").is_err());
        assert!(matches!(
            parse_duration("unreported_node", "1.5.2h"),
            Err(ConfigError::Duration { field: "unreported_node", .. })
        ));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("PUPPETDB_URL", "https://pdb.internal:8081/pdb/query"),
            ("PUPPETDB_SSL_SKIP_VERIFY", "yes"),
            ("PUPPETDB_UNREPORTED_NODE", "30m"),
            ("PUPPETDB_RESET_STALE_STATUSES", "false"),
        ]
        .into_iter()
        .collect();

        let mut cfg = ExporterConfig::default();
        cfg.apply_env(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(cfg.puppetdb_url, "https://pdb.internal:8081/pdb/query");
        assert!(cfg.ssl_skip_verify);
        assert!(!cfg.reset_stale_statuses);
        assert_eq!(cfg.unreported_threshold().unwrap(), Duration::from_secs(1800));
    }

    #[test]
    fn test_bad_bool_rejected() {
        let mut cfg = ExporterConfig::default();
        let err = cfg
            .apply_env(|k| (k == "PUPPETDB_SSL_SKIP_VERIFY").then(|| "maybe".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Bool { field: "ssl_skip_verify", .. }));
    }

    #[test]
    fn test_identity_requires_both_files() {
        let cfg = ExporterConfig { cert_file: Some("/etc/puppetlabs/cert.pem".into()), ..Default::default() };
        assert!(matches!(cfg.validate(), Err(ConfigError::IncompleteIdentity)));
    }

    #[test]
    fn test_metrics_path_validation() {
        let cfg = ExporterConfig { metrics_path: "metrics".into(), ..Default::default() };
        assert!(matches!(cfg.validate(), Err(ConfigError::MetricsPath(_))));
        let cfg = ExporterConfig { metrics_path: "/health".into(), ..Default::default() };
        assert!(matches!(cfg.validate(), Err(ConfigError::MetricsPath(_))));
        let cfg = ExporterConfig { metrics_path: "/puppetdb/metrics".into(), ..Default::default() };
        cfg.validate().unwrap();
    }

    #[tokio::test]
    async fn test_load_yaml_file_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "puppetdb_url: http://localhost:8080/pdb/query").unwrap();
        writeln!(file, "scrape_interval: 1m").unwrap();

        let cfg = load_config_file(file.path()).await.unwrap();
        assert_eq!(cfg.puppetdb_url, "http://localhost:8080/pdb/query");
        assert_eq!(cfg.scrape_interval().unwrap(), Duration::from_secs(60));
        // champs absents -> valeurs par défaut
        assert_eq!(cfg.unreported_node, "2h");
        assert_eq!(cfg.metrics_path, "/metrics");
    }

    #[tokio::test]
    async fn test_missing_and_empty_files_use_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.yaml");
        assert_eq!(load_config_file(&missing).await.unwrap(), ExporterConfig::default());

        let empty = dir.path().join("empty.yaml");
        std::fs::write(&empty, "  \n").unwrap();
        assert_eq!(load_config_file(&empty).await.unwrap(), ExporterConfig::default());
    }

    #[tokio::test]
    async fn test_invalid_yaml_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "ssl_skip_verify: [not, a, bool]").unwrap();
        assert!(matches!(load_config_file(file.path()).await, Err(ConfigError::Parse { .. })));
    }
}
