use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use pickup_ledger::api;
use pickup_ledger::config::Config;
use pickup_ledger::engine::invoice_sync::run_invoice_sync;
use pickup_ledger::error::AppError;
use pickup_ledger::state::AppState;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false);
    if config.log_json {
        subscriber.json().init();
    } else {
        subscriber.compact().init();
    }

    let shared_state = Arc::new(AppState::from_config(&config)?);

    let app = api::rest::router(shared_state.clone());

    if config.invoice_sync_interval.is_zero() {
        tracing::info!("periodic invoice sync disabled; refresh runs on demand only");
    } else {
        tokio::spawn(run_invoice_sync(
            shared_state.clone(),
            config.invoice_sync_interval,
        ));
    }

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port = config.http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
