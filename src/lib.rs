pub mod config;
pub mod error;
pub mod health;
pub mod logging;
pub mod middleware;
pub mod observability;
pub mod server;

pub use config::*;
pub use error::*;
pub use server::*;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crate::logging::{LogWriter, Logger, TracingLogger, init_global, init_logging, kv};
use crate::observability::metrics::{Metric, PrometheusConfig, PrometheusMetric};
use crate::observability::{
    ExporterConfig, Observability, TracingSettings, build_tracer_provider, new_exporter,
};

/// Main server entry point for library usage
///
/// Loads configuration, builds the span exporter, tracer provider, logger and
/// metric registry, then serves until a shutdown signal arrives.
pub async fn run_server(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let obs = build_observability(&config)?;

    ::tracing::info!(
        environment = config.environment.as_str(),
        exporter = %config.tracing.exporter,
        "HTTP service starting up"
    );

    server::start_server(config, obs).await
}

/// Wire the observability bundle described by `config`.
///
/// Must run inside a Tokio runtime: spans are batched on it.
pub fn build_observability(config: &AppConfig) -> Result<Observability> {
    let logger: Arc<dyn Logger> = Arc::new(TracingLogger::new().with_static_fields([
        kv("service", &config.tracing.service_name),
        kv("environment", config.environment.as_str()),
    ]));
    if !init_global(logger.clone()) {
        ::tracing::debug!("Process-wide logger already set");
    }

    let exporter_config = ExporterConfig::default()
        .with_jaeger_endpoint(&config.tracing.jaeger_endpoint)
        .with_otlp_endpoint(&config.tracing.otlp_endpoint)
        .with_otlp_grpc_endpoint(&config.tracing.otlp_grpc_endpoint)
        .with_export_timeout(Duration::from_secs(config.tracing.export_timeout))
        .with_writer(Box::new(LogWriter::new(logger.clone(), "span exported")));
    let exporter = new_exporter(&config.tracing.exporter, exporter_config)?;

    let provider = build_tracer_provider(
        exporter,
        &TracingSettings {
            service_name: config.tracing.service_name.clone(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: config.environment.as_str().to_string(),
            sample_rate: config.tracing.sample_rate,
        },
    );

    if let Err(e) = init_logging(&config.logging, Some(&provider)) {
        // A subscriber installed by the embedding process wins.
        ::tracing::warn!(error = %e, "Keeping existing log subscriber");
    }

    let mut builder = Observability::builder()
        .logger(logger)
        .tracer_provider(provider);
    if config.metrics.enabled {
        let metric: Arc<dyn Metric> = Arc::new(PrometheusMetric::new(PrometheusConfig {
            prefix: config.metrics.prefix.clone(),
            process_metrics: config.metrics.process_metrics,
            ..Default::default()
        })?);
        builder = builder.metric(metric);
    }

    Ok(builder.build())
}
