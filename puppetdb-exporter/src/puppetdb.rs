//! PuppetDB query API client
//!
//! Only two queries are needed by the exporter:
//! - `GET {url}/v4/nodes`
//! - `GET {url}/v4/reports/{hash}/metrics`
//!
//! TLS uses the Puppet agent certificate (cert + key PEM) and the Puppet CA.

use crate::config::ExporterConfig;
use crate::models::{NodeIn, NodeRecord, ReportMetricIn, ReportMetricRecord};
use reqwest::{Certificate, Client, Identity};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum PuppetDbError {
    #[error("failed to read {path:?}: {source}")]
    ReadPem { path: PathBuf, source: std::io::Error },
    #[error("invalid TLS material: {0}")]
    Tls(#[source] reqwest::Error),
    #[error("request to {url} failed: {source}")]
    Http { url: String, source: reqwest::Error },
    #[error("{url} answered {status}: {body}")]
    Status { url: String, status: u16, body: String },
    #[error("invalid JSON from {url}: {source}")]
    Decode { url: String, source: reqwest::Error },
}

/// Read side of PuppetDB used by the aggregator.
pub trait PuppetDb: Send + Sync {
    fn nodes(&self) -> impl Future<Output = Result<Vec<NodeRecord>, PuppetDbError>> + Send;

    fn report_metrics(
        &self,
        report_hash: &str,
    ) -> impl Future<Output = Result<Vec<ReportMetricRecord>, PuppetDbError>> + Send;
}

#[derive(Debug, Clone)]
pub struct PuppetDbClient {
    http: Client,
    base_url: String,
}

impl PuppetDbClient {
    pub fn from_config(cfg: &ExporterConfig, timeout: Duration) -> Result<Self, PuppetDbError> {
        let mut builder = Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .danger_accept_invalid_certs(cfg.ssl_skip_verify);

        if let Some(ca) = &cfg.ca_file {
            let pem = read_pem(ca)?;
            builder = builder.add_root_certificate(Certificate::from_pem(&pem).map_err(PuppetDbError::Tls)?);
        }

        if let (Some(cert), Some(key)) = (&cfg.cert_file, &cfg.key_file) {
            // Identity::from_pem veut cert + clé dans le même buffer
            let mut pem = read_pem(cert)?;
            pem.push(b'\n');
            pem.extend(read_pem(key)?);
            builder = builder.identity(Identity::from_pem(&pem).map_err(PuppetDbError::Tls)?);
        }

        let http = builder.build().map_err(PuppetDbError::Tls)?;
        Ok(Self { http, base_url: cfg.puppetdb_url.trim_end_matches('/').to_string() })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, PuppetDbError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|source| PuppetDbError::Http { url: url.clone(), source })?;

        let status = resp.status();
        if !status.is_success() {
            let body: String = resp.text().await.unwrap_or_default().chars().take(256).collect();
            return Err(PuppetDbError::Status { url, status: status.as_u16(), body });
        }

        resp.json::<T>().await.map_err(|source| PuppetDbError::Decode { url, source })
    }
}

impl PuppetDb for PuppetDbClient {
    async fn nodes(&self) -> Result<Vec<NodeRecord>, PuppetDbError> {
        let nodes: Vec<NodeIn> = self.get_json("/v4/nodes").await?;
        Ok(nodes.into_iter().map(NodeRecord::from).collect())
    }

    async fn report_metrics(&self, report_hash: &str) -> Result<Vec<ReportMetricRecord>, PuppetDbError> {
        let path = format!("/v4/reports/{}/metrics", report_hash);
        let metrics: Vec<ReportMetricIn> = self.get_json(&path).await?;
        Ok(metrics.into_iter().map(ReportMetricRecord::from).collect())
    }
}

fn read_pem(path: &Path) -> Result<Vec<u8>, PuppetDbError> {
    std::fs::read(path).map_err(|source| PuppetDbError::ReadPem { path: path.to_path_buf(), source })
}
