use anyhow::Result;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::TracerProvider;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;

/// Install the process subscriber.
///
/// Supports two formats:
/// - "json": structured output for production
/// - "pretty": human-readable output for development
///
/// When a tracer provider is given, an OpenTelemetry layer is added so log
/// events are correlated with the active span.
pub fn init_logging(config: &LoggingConfig, provider: Option<&TracerProvider>) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let otel_layer = provider.map(|p| {
        tracing_opentelemetry::layer().with_tracer(p.tracer(env!("CARGO_PKG_NAME")))
    });
    let subscriber = tracing_subscriber::registry().with(env_filter).with(otel_layer);

    match config.format.as_str() {
        "json" => subscriber
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true),
            )
            .try_init()?,
        "pretty" => subscriber
            .with(tracing_subscriber::fmt::layer().pretty().with_target(true))
            .try_init()?,
        other => {
            return Err(anyhow::anyhow!(
                "Unsupported log format: {}. Use 'json' or 'pretty'",
                other
            ));
        }
    }

    tracing::info!(
        level = %config.level,
        format = %config.format,
        otel = provider.is_some(),
        "Logging initialized"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_format_is_rejected() {
        let config = LoggingConfig {
            level: "info".to_string(),
            format: "xml".to_string(),
        };
        let err = init_logging(&config, None).unwrap_err();
        assert!(err.to_string().contains("Unsupported log format"));
    }
}
