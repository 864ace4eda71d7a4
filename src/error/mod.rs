pub mod types;

pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    #[test]
    fn test_config_error_messages() {
        let err = ConfigError::MissingEndpoint {
            backend: "OTLP",
            variable: "OTEL_EXPORTER_OTLP_ENDPOINT",
        };
        assert_eq!(
            err.to_string(),
            "cannot use OpenTelemetry OTLP if OTEL_EXPORTER_OTLP_ENDPOINT is empty"
        );

        let err = ConfigError::UnknownExporter("ZIPKIN".to_string());
        assert_eq!(err.to_string(), "unknown name='ZIPKIN' for OpenTelemetry span exporter");
    }

    #[test]
    fn test_label_mismatch_names_both_label_sets() {
        let err = LabelMismatch {
            kind: MetricKind::Counter,
            name: "orders".to_string(),
            registered: vec!["a".to_string(), "b".to_string()],
            requested: vec!["a".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.starts_with("counter vector name 'orders' already registered"));
        assert!(msg.contains(r#"["a", "b"]"#));
        assert!(msg.contains(r#"requested ["a"]"#));
    }

    #[test]
    fn test_combined_metrics_error_aggregates() {
        let err = MetricsError::Combined(vec![
            MetricsError::Close { backend: "a".into(), reason: "boom".into() },
            MetricsError::Close { backend: "b".into(), reason: "bang".into() },
        ]);
        let msg = err.to_string();
        assert!(msg.starts_with("2 metric backend(s) failed to close"));
        assert!(msg.contains("boom"));
        assert!(msg.contains("bang"));
    }

    #[test]
    fn test_error_to_response_conversion() {
        let err = AppError::InvalidInput("test".to_string());
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);

        let err = AppError::Config(ConfigError::UnknownExporter("x".into()));
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);

        let internal = anyhow::anyhow!("Connection to 192.168.1.100:5432 failed");
        let response = AppError::Internal(internal).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
