use std::future::{Future, IntoFuture};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::Router;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::Notify;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::error::ConfigError;
use crate::health::{SystemState, routes};
use crate::middleware::{Pipeline, PipelineOptions};
use crate::observability::Observability;

/// Pipeline settings taken from the application configuration.
pub fn pipeline_options(config: &AppConfig) -> PipelineOptions {
    PipelineOptions {
        metrics_enabled: config.metrics.enabled,
        metrics_path: config.metrics.path.clone(),
        access_log_message: config.access_log.message.clone(),
        max_body_log_bytes: config.access_log.max_body_bytes,
        skip_paths: config.access_log.skip_paths.clone(),
        ..Default::default()
    }
}

/// Create the application router with every observability stage in front.
///
/// Fails when a stage cannot be built from `obs`, e.g. metrics enabled on a
/// registry that cannot be exposed.
pub fn create_router(
    config: &AppConfig,
    obs: &Observability,
    state: SystemState,
) -> Result<Router, ConfigError> {
    let pipeline = Pipeline::from_observability(obs, &pipeline_options(config))?;
    Ok(pipeline.wrap(routes(state)))
}

/// Start the HTTP server and block until it has shut down.
///
/// On SIGINT/SIGTERM in-flight requests get `server.shutdown_timeout`
/// seconds to finish; buffered spans are then flushed and the metric
/// registry closed.
pub async fn start_server(config: AppConfig, obs: Observability) -> Result<()> {
    let state = SystemState::new(Default::default(), obs.tracer_provider());
    let app = create_router(&config, &obs, state)?;
    info!("Router created successfully");

    let bind_addr = format!("{}:{}", config.server.bind, config.server.port);
    let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to bind to {}: {}. Is another process using this port?",
            bind_addr,
            e
        )
    })?;
    info!("Server successfully bound to {}", bind_addr);

    let grace = Duration::from_secs(config.server.shutdown_timeout);
    let served = serve(listener, app, shutdown_signal(), grace).await;

    let flushed = tokio::task::spawn_blocking(move || obs.shutdown()).await;
    match flushed {
        Ok(Ok(())) => info!("Observability shut down"),
        Ok(Err(e)) => warn!(error = %e, "Failed to close metrics"),
        Err(e) => warn!(error = %e, "Observability shutdown task failed"),
    }

    served?;
    info!("Server shutdown complete");
    Ok(())
}

/// Serve `app` until `shutdown` resolves, then wait at most `grace` for
/// in-flight requests.
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F, grace: Duration) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let triggered = Arc::new(Notify::new());
    let notify = triggered.clone();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            notify.notify_one();
        })
        .into_future();

    tokio::select! {
        result = server => result?,
        _ = async {
            triggered.notified().await;
            tokio::time::sleep(grace).await;
        } => {
            warn!(grace_secs = grace.as_secs(), "Graceful shutdown timed out, dropping open connections");
        }
    }
    Ok(())
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
