use dotenvy::dotenv;
use fv_assistant::config::get_configuration;
use fv_assistant::services::credential::EnvSecretStore;
use fv_assistant::services::metrics::init_metrics;
use fv_assistant::services::providers::gemini::GeminiProvider;
use fv_assistant::startup::{build_router, build_state};
use service_core::observability::init_tracing;
use std::sync::Arc;
use tokio::signal;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let configuration = get_configuration().map_err(|e| {
        eprintln!("Failed to read configuration: {}", e);
        anyhow::anyhow!("Configuration error: {}", e)
    })?;

    init_tracing("fv-assistant", &configuration.telemetry);
    init_metrics()?;

    let provider = GeminiProvider::new(
        configuration.model.api_base.clone(),
        configuration.model.request_timeout(),
    )
    .map_err(|e| anyhow::anyhow!("Failed to build model provider client: {}", e))?;

    let state = build_state(&configuration, Arc::new(EnvSecretStore), Arc::new(provider));
    let session_idle = configuration.server.session_idle();
    let _reaper = state.chats.spawn_reaper(session_idle);
    let _session_reaper = state.sessions.spawn_reaper(session_idle / 4);

    let app = build_router(state, session_idle);

    let address = configuration.server.address();
    let listener = tokio::net::TcpListener::bind(&address).await.map_err(|e| {
        tracing::error!("Failed to bind TCP listener to {}: {}", address, e);
        anyhow::anyhow!("Failed to bind to address {}: {}", address, e)
    })?;

    info!(
        model = %configuration.model.id,
        "Starting fv-assistant on {}", address
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| {
            tracing::error!("Server error: {}", e);
            anyhow::anyhow!("Server error: {}", e)
        })?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
