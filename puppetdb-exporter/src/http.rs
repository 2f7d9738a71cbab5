/**
 * ENDPOINT HTTP - Exposition Prometheus de l'exporter
 *
 * RÔLE :
 * Sert le registry Prometheus construit au démarrage, sans état global.
 *
 * ROUTES :
 * - GET /               : page d'accueil avec lien vers les métriques
 * - GET <metrics_path>  : format texte Prometheus 0.0.4 (défaut /metrics)
 * - GET /health         : liveness, toujours "ok"
 * - GET /health/scrape  : état de la boucle de scrape (JSON)
 *
 * La lecture du registry est concurrente de la boucle de scrape ; chaque
 * gauge est lue atomiquement, jamais de valeur partielle.
 */

use crate::health::{ScrapeHealth, ScrapeHealthView};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::{routing::get, Json, Router};
use prometheus::{Encoder, TextEncoder};
use tracing::error;

#[derive(Clone)]
pub struct AppState {
    pub registry: prometheus::Registry,
    pub health: ScrapeHealth,
    pub metrics_path: String,
}

#[derive(Debug)]
pub enum MetricsError {
    EncodingFailed,
}

impl IntoResponse for MetricsError {
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response()
    }
}

pub fn build_router(app_state: AppState) -> Router {
    let metrics_path = app_state.metrics_path.clone();
    Router::new()
        .route("/", get(landing))
        .route("/health", get(|| async { "ok" }))
        .route("/health/scrape", get(get_scrape_health))
        .route(&metrics_path, get(get_metrics))
        .with_state(app_state)
}

// GET / (page d'accueil)
async fn landing(State(app): State<AppState>) -> Html<String> {
    Html(format!(
        "<html><head><title>PuppetDB Exporter</title></head>\
         <body><h1>PuppetDB Exporter</h1><p><a href=\"{}\">Metrics</a></p></body></html>",
        app.metrics_path
    ))
}

// GET <metrics_path>
async fn get_metrics(State(app): State<AppState>) -> Result<Response, MetricsError> {
    let encoder = TextEncoder::new();
    let families = app.registry.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buffer) {
        error!("failed to encode metrics: {}", e);
        return Err(MetricsError::EncodingFailed);
    }
    Ok(([(header::CONTENT_TYPE, encoder.format_type().to_string())], buffer).into_response())
}

// GET /health/scrape
async fn get_scrape_health(State(app): State<AppState>) -> Json<ScrapeHealthView> {
    Json(app.health.get_health())
}
