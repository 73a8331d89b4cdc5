//! Donation service — entry point.
//!
//! Serves the donation-update and checkout-session endpoints over a small
//! Axum REST API, backed by SQLite for donations, campaigns and vaults and
//! by the payment provider's HTTP API for hosted checkout.

mod api;
mod checkout;
mod config;
mod db;
mod errors;
mod models;
mod payments;
#[cfg(test)]
mod test_utils;
mod transitions;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use checkout::CheckoutGate;
use config::Config;
use db::{Repository, SqliteRepository};
use payments::{PaymentProvider, StripeClient};
use transitions::TransitionHandler;

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

    // ─── Collaborators ────────────────────────────────────
    let repo: Arc<dyn Repository> = Arc::new(SqliteRepository::new(pool));
    let http = StripeClient::build_http_client(config.http_timeout_secs)?;
    let provider: Arc<dyn PaymentProvider> = Arc::new(StripeClient::new(
        http,
        config.stripe_api_base.clone(),
        config.stripe_secret_key.clone(),
    ));

    let state = Arc::new(api::ApiState {
        repo: repo.clone(),
        transitions: TransitionHandler::new(repo.clone()),
        checkout: CheckoutGate::new(repo, provider, config.default_currency),
    });

    // ─── REST API ─────────────────────────────────────────
    let app = api::router(state);

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {e}");
                return;
            }
            info!("Shutdown signal received");
            shutdown.cancel();
        }
    });

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    info!("API stopped");
    Ok(())
}
