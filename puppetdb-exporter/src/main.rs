/**
 * PUPPETDB EXPORTER - Point d'entrée principal
 *
 * RÔLE : Bootstrap : config, client PuppetDB, registry de gauges, boucle de
 * scrape, serveur HTTP d'exposition.
 *
 * ARCHITECTURE : une task tokio pour la boucle de scrape + Axum pour /metrics.
 * Le registry est construit ici et partagé explicitement, aucun état global.
 * Ctrl-C arrête le serveur puis la boucle (le cycle en cours se termine).
 */

use anyhow::{Context, Result};
use puppetdb_exporter::config::load_config;
use puppetdb_exporter::http::{self, AppState};
use puppetdb_exporter::{MetricRegistry, PuppetDbClient, ScrapeHealth, ScrapeLoop};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("puppetdb_exporter=info")),
        )
        .init();

    let cfg = load_config().await.context("failed to load configuration")?;
    info!("scraping {} every {}", cfg.puppetdb_url, cfg.scrape_interval);

    let client = PuppetDbClient::from_config(&cfg, cfg.request_timeout()?)
        .context("failed to create PuppetDB client")?;

    // registry explicite, partagé avec l'endpoint HTTP
    let metrics = MetricRegistry::new().context("failed to create gauges")?;
    let registry = prometheus::Registry::new();
    registry
        .register(Box::new(metrics.clone()))
        .context("failed to register gauges")?;

    let health = ScrapeHealth::new();
    let scrape = ScrapeLoop::new(Arc::new(client), metrics, cfg.scrape_interval()?, &cfg.unreported_node)
        .context("failed to parse unreported duration")?
        .with_reset_stale_statuses(cfg.reset_stale_statuses)
        .with_health(health.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scrape_task = tokio::spawn(scrape.run(shutdown_rx));

    let app = http::build_router(AppState {
        registry,
        health,
        metrics_path: cfg.metrics_path.clone(),
    });

    let addr = cfg.listen_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("listening on http://{addr}{}", cfg.metrics_path);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("failed to listen for ctrl-c: {}", e);
            }
            info!("shutdown requested");
        })
        .await
        .context("HTTP server failed")?;

    let _ = shutdown_tx.send(true);
    if let Err(e) = scrape_task.await {
        error!("scrape task panicked: {}", e);
    }
    Ok(())
}
