//! Launchpad sale service — entry point.
//!
//! Restores every sale from SQLite, starts one writer task per sale and
//! exposes the sale lifecycle (contribute, resolve, claim, refund) over an
//! Axum REST API.

mod address;
mod api;
mod config;
mod db;
mod errors;
mod events;
mod kyc;
mod project;
mod sales;
mod writer;

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::Config;
use kyc::KycRegistry;
use sales::SaleRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    // Set up the SQLite connection pool and run migrations.
    let pool = db::init_pool(&config.database_url).await?;

    let client = Client::builder()
        .timeout(Duration::from_secs(config.kyc_timeout_secs))
        .build()?;
    if config.kyc_oracle_url.is_none() {
        info!("KYC_ORACLE_URL not set; KYC-gated sales will reject every contributor");
    }
    let kyc = Arc::new(
        KycRegistry::new(client, config.kyc_oracle_url.clone()).with_cache_limits(
            Duration::from_secs(config.kyc_cache_ttl_secs),
            config.kyc_cache_capacity,
        ),
    );

    // ─── Sale writers ─────────────────────────────────────
    let shutdown = CancellationToken::new();
    let sales = SaleRegistry::load(
        pool.clone(),
        Arc::clone(&kyc),
        config.writer_queue_depth,
        shutdown.clone(),
    )
    .await?;
    info!("Restored {} sale(s)", sales.list().len());

    // ─── REST API ─────────────────────────────────────────
    let api_state = Arc::new(api::ApiState { pool, sales, kyc });

    let app = api::router(api_state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    info!("Shut down cleanly");
    Ok(())
}

/// Resolve on Ctrl-C and stop every sale writer.
async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
    }
    info!("Shutdown requested");
    shutdown.cancel();
}
