use anyhow::Context;
use tracing::info;

use wms_api::app::{build_app, services};
use wms_infra::{EngineConfig, WarehouseStore, open_store};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = EngineConfig::from_env().context("invalid WMS_* configuration")?;
    wms_observability::init_with(config.log_format);

    if std::env::args().skip(1).any(|arg| arg == "--check") {
        return check(&config).await;
    }

    let (services, background) = services::build_services(&config).await?;
    let app = build_app(services);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    background.shutdown().await;
    info!("stopped");
    Ok(())
}

/// One-shot readiness probe for process supervisors: exit 0 when the store
/// answers, 1 otherwise.
async fn check(config: &EngineConfig) -> anyhow::Result<()> {
    let store = open_store(config)
        .await
        .context("failed to open warehouse store")?;
    store.ping().await.context("store did not answer ping")?;
    info!("store ready");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to listen for SIGTERM");
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
    info!("shutdown signal received");
}
