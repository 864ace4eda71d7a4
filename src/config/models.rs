use garde::Validate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize, Validate, Default)]
pub struct AppConfig {
    #[garde(dive)]
    #[serde(default)]
    pub server: ServerConfig,

    #[garde(dive)]
    #[serde(default)]
    pub logging: LoggingConfig,

    #[garde(dive)]
    #[serde(default)]
    pub tracing: TracingConfig,

    #[garde(dive)]
    #[serde(default)]
    pub metrics: MetricsConfig,

    #[garde(dive)]
    #[serde(default)]
    pub access_log: AccessLogSettings,

    #[garde(skip)]
    #[serde(default)]
    pub environment: Environment,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ServerConfig {
    #[garde(range(min = 1024, max = 65535))]
    pub port: u16,

    #[garde(length(min = 1), custom(validate_bind_address))]
    #[serde(default = "default_bind")]
    pub bind: String,

    #[garde(range(min = 1, max = 300))]
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64, // seconds
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_shutdown_timeout() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            bind: default_bind(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct LoggingConfig {
    #[garde(length(min = 1))]
    #[serde(default = "default_log_level")]
    pub level: String, // trace, debug, info, warn, error

    #[garde(pattern(r"^(json|pretty)$"))]
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Span exporter selection and sampling.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct TracingConfig {
    /// One of "", NOOP, STDOUT, JAEGER, OTLP, OTLP_GRPC (any case).
    #[garde(custom(validate_exporter_name))]
    pub exporter: String,

    #[garde(length(min = 1))]
    pub service_name: String,

    #[garde(range(min = 0.0, max = 1.0))]
    pub sample_rate: f64,

    #[garde(skip)]
    pub jaeger_endpoint: String,

    #[garde(skip)]
    pub otlp_endpoint: String,

    #[garde(skip)]
    pub otlp_grpc_endpoint: String,

    #[garde(range(min = 1, max = 300))]
    pub export_timeout: u64, // seconds
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            exporter: "NOOP".to_string(),
            service_name: env!("CARGO_PKG_NAME").to_string(),
            sample_rate: 1.0,
            jaeger_endpoint: "http://localhost:4318".to_string(),
            otlp_endpoint: "localhost:4318".to_string(),
            otlp_grpc_endpoint: "localhost:4317".to_string(),
            export_timeout: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct MetricsConfig {
    #[garde(skip)]
    pub enabled: bool,

    #[garde(pattern(r"^/"))]
    pub path: String,

    /// Prepended to every metric name.
    #[garde(skip)]
    pub prefix: String,

    /// Expose CPU, memory and file descriptor usage of the process.
    #[garde(skip)]
    pub process_metrics: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "/metrics".to_string(),
            prefix: String::new(),
            process_metrics: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct AccessLogSettings {
    #[garde(length(min = 1))]
    pub message: String,

    /// Logged response bodies at or above this size are replaced by a placeholder.
    #[garde(range(min = 1))]
    pub max_body_bytes: usize,

    #[garde(skip)]
    pub skip_paths: Vec<String>,
}

impl Default for AccessLogSettings {
    fn default() -> Self {
        Self {
            message: "request logger".to_string(),
            max_body_bytes: 1_000_000,
            skip_paths: vec!["/ping".to_string()],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Staging,
    #[default]
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

fn validate_bind_address(value: &str, _: &()) -> garde::Result {
    value
        .parse::<std::net::IpAddr>()
        .map(|_| ())
        .map_err(|_| garde::Error::new("Invalid IP address"))
}

fn validate_exporter_name(value: &str, _: &()) -> garde::Result {
    match value.trim().to_uppercase().as_str() {
        "" | "NOOP" | "STDOUT" | "JAEGER" | "OTLP" | "OTLP_GRPC" => Ok(()),
        _ => Err(garde::Error::new(format!("unknown span exporter '{value}'"))),
    }
}
