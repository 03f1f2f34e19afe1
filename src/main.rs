use std::sync::Arc;
use std::time::Duration;

use rider_lifecycle::api;
use rider_lifecycle::backend::http::HttpBackend;
use rider_lifecycle::backend::memory::InMemoryBackend;
use rider_lifecycle::backend::BackendApi;
use rider_lifecycle::config::Config;
use rider_lifecycle::engine::coordinator::run_status_observer;
use rider_lifecycle::error::AppError;
use rider_lifecycle::state::AppState;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;
    init_tracing(&config);

    let backend: Arc<dyn BackendApi> = match config.backend_url.as_deref() {
        Some(url) => {
            let backend = HttpBackend::new(
                url,
                config.backend_token.as_deref(),
                Duration::from_secs(config.backend_timeout_secs),
            )?;
            tracing::info!(backend_url = %url, "using http backend");
            Arc::new(backend)
        }
        None => {
            tracing::warn!("BACKEND_URL not set; running against the in-memory backend");
            Arc::new(InMemoryBackend::new())
        }
    };

    let (app_state, observations_rx) = AppState::new(backend, &config);
    let shared_state = Arc::new(app_state);

    tokio::spawn(run_status_observer(
        shared_state.coordinator.clone(),
        observations_rx,
    ));

    let app = api::rest::router(shared_state.clone());

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port = config.http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    shared_state.coordinator.tracker().stop().await;
    tracing::info!("shutdown complete");

    Ok(())
}

fn init_tracing(config: &Config) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false);

    if config.log_json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
