use thiserror::Error;
use axum::response::{IntoResponse, Response};
use axum::http::StatusCode;

/// Startup-time configuration failures. These are returned by constructors
/// and must stop the server from starting.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot setup metrics middleware: {0}")]
    MissingRegisterer(String),

    #[error("cannot setup metrics middleware: metric backend exposes no gatherer for {0}")]
    MissingGatherer(String),

    #[error("cannot use OpenTelemetry {backend} if {variable} is empty")]
    MissingEndpoint {
        backend: &'static str,
        variable: &'static str,
    },

    #[error("unknown name='{0}' for OpenTelemetry span exporter")]
    UnknownExporter(String),

    #[error("cannot build {backend} span exporter: {reason}")]
    ExporterBuild {
        backend: &'static str,
        reason: String,
    },

    #[error("invalid option {option}: {reason}")]
    InvalidOption {
        option: &'static str,
        reason: String,
    },

    #[error(transparent)]
    Labels(#[from] LabelMismatch),
}

/// Which instrument family a metric vector belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
    Timer,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Timer => "timer",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A metric name was requested with a label-name set that differs from the
/// one it was first registered with. This is a programmer error: hosts should
/// crash on it or surface it as a startup validation failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} vector name '{name}' already registered: mismatch labels: registered {registered:?}, requested {requested:?}")]
pub struct LabelMismatch {
    pub kind: MetricKind,
    pub name: String,
    pub registered: Vec<String>,
    pub requested: Vec<String>,
}

#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("failed to close {backend} metrics: {reason}")]
    Close {
        backend: String,
        reason: String,
    },

    #[error("{} metric backend(s) failed to close: {}", .0.len(), join_errors(.0))]
    Combined(Vec<MetricsError>),
}

fn join_errors(errors: &[MetricsError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Internal error")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::Config(_) | AppError::Server(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        // Don't expose internal error details
        let body = match &self {
            AppError::Internal(_) | AppError::Config(_) => "Internal error".to_string(),
            _ => self.to_string(),
        };

        (status, body).into_response()
    }
}
