/*!
Stub PuppetDB en mémoire

Implémente le trait `PuppetDb` de l'exporter. Les clones partagent le même
état, donc un test peut modifier les données entre deux cycles pendant que
l'aggregator détient sa propre copie.
*/

use parking_lot::Mutex;
use puppetdb_exporter::{NodeRecord, PuppetDb, PuppetDbError, ReportMetricRecord};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

type Canned<T> = Result<T, String>;

#[derive(Clone)]
pub struct MockPuppetDb {
    nodes: Arc<Mutex<Canned<Vec<NodeRecord>>>>,
    reports: Arc<Mutex<HashMap<String, Canned<Vec<ReportMetricRecord>>>>>,
    node_calls: Arc<AtomicUsize>,
    report_requests: Arc<Mutex<Vec<String>>>,
}

impl Default for MockPuppetDb {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPuppetDb {
    pub fn new() -> Self {
        Self {
            nodes: Arc::new(Mutex::new(Ok(Vec::new()))),
            reports: Arc::new(Mutex::new(HashMap::new())),
            node_calls: Arc::new(AtomicUsize::new(0)),
            report_requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Remplace la liste de nodes renvoyée par `nodes()`
    pub fn set_nodes(&self, nodes: Vec<NodeRecord>) {
        *self.nodes.lock() = Ok(nodes);
    }

    /// `nodes()` renverra une erreur HTTP 503 jusqu'au prochain `set_nodes`
    pub fn fail_nodes(&self, message: &str) {
        *self.nodes.lock() = Err(message.to_string());
    }

    pub fn set_report<I>(&self, report_hash: &str, records: I)
    where
        I: IntoIterator<Item = ReportMetricRecord>,
    {
        self.reports
            .lock()
            .insert(report_hash.to_string(), Ok(records.into_iter().collect()));
    }

    pub fn fail_report(&self, report_hash: &str, message: &str) {
        self.reports
            .lock()
            .insert(report_hash.to_string(), Err(message.to_string()));
    }

    pub fn node_calls(&self) -> usize {
        self.node_calls.load(Ordering::SeqCst)
    }

    /// Hashes demandés à `report_metrics`, dans l'ordre des appels
    pub fn report_requests(&self) -> Vec<String> {
        self.report_requests.lock().clone()
    }

    pub fn clear(&self) {
        *self.nodes.lock() = Ok(Vec::new());
        self.reports.lock().clear();
        self.report_requests.lock().clear();
        self.node_calls.store(0, Ordering::SeqCst);
    }
}

fn unavailable(path: String, message: &str) -> PuppetDbError {
    PuppetDbError::Status { url: format!("mock://puppetdb{}", path), status: 503, body: message.to_string() }
}

impl PuppetDb for MockPuppetDb {
    async fn nodes(&self) -> Result<Vec<NodeRecord>, PuppetDbError> {
        self.node_calls.fetch_add(1, Ordering::SeqCst);
        let canned = self.nodes.lock().clone();
        canned.map_err(|message| unavailable("/v4/nodes".into(), &message))
    }

    async fn report_metrics(&self, report_hash: &str) -> Result<Vec<ReportMetricRecord>, PuppetDbError> {
        self.report_requests.lock().push(report_hash.to_string());
        let path = format!("/v4/reports/{}/metrics", report_hash);
        let canned = self.reports.lock().get(report_hash).cloned();
        match canned {
            Some(Ok(records)) => Ok(records),
            Some(Err(message)) => Err(unavailable(path, &message)),
            None => Err(PuppetDbError::Status { url: format!("mock://puppetdb{}", path), status: 404, body: String::new() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{metric, NodeBuilder};

    #[tokio::test]
    async fn test_clones_share_state() {
        let db = MockPuppetDb::new();
        let other = db.clone();
        db.set_nodes(vec![NodeBuilder::new("web01").build()]);

        assert_eq!(other.nodes().await.unwrap().len(), 1);
        assert_eq!(db.node_calls(), 1);
    }

    #[tokio::test]
    async fn test_canned_failures() {
        let db = MockPuppetDb::new();
        db.fail_nodes("connection refused");
        assert!(matches!(db.nodes().await, Err(PuppetDbError::Status { status: 503, .. })));

        db.set_report("abc", [metric("time", "total", 3.5)]);
        db.fail_report("def", "boom");
        assert_eq!(db.report_metrics("abc").await.unwrap().len(), 1);
        assert!(db.report_metrics("def").await.is_err());
        assert!(matches!(db.report_metrics("zzz").await, Err(PuppetDbError::Status { status: 404, .. })));
        assert_eq!(db.report_requests(), vec!["abc", "def", "zzz"]);
    }

    #[tokio::test]
    async fn test_clear_resets_everything() {
        let db = MockPuppetDb::new();
        db.fail_nodes("down");
        db.set_report("abc", [metric("time", "total", 1.0)]);
        let _ = db.nodes().await;
        let _ = db.report_metrics("abc").await;

        db.clear();

        assert!(db.nodes().await.unwrap().is_empty());
        assert_eq!(db.node_calls(), 1);
        assert_eq!(db.report_requests(), Vec::<String>::new());
        assert!(db.report_metrics("abc").await.is_err());
    }
}
