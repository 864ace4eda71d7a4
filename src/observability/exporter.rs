//! Span exporter selection
//!
//! [`new_exporter`] maps a symbolic backend name to a concrete span exporter:
//!
//! | name              | exporter                                   |
//! |-------------------|--------------------------------------------|
//! | `""`, `NOOP`      | discards spans, never fails                |
//! | `STDOUT`          | pretty JSON written to an injected sink    |
//! | `JAEGER`          | OTLP/HTTP to Jaeger's collector            |
//! | `OTLP`            | OTLP/HTTP                                  |
//! | `OTLP_GRPC`       | OTLP/gRPC                                  |
//!
//! Names are trimmed and matched case-insensitively. Push backends need a
//! non-empty endpoint; an empty one is a configuration error.

use std::fmt;
use std::io::{self, Write};
use std::time::Duration;

use futures::future::{self, BoxFuture};
use opentelemetry::trace::TraceError;
use opentelemetry_otlp::{SpanExporterBuilder, WithExportConfig};
use opentelemetry_sdk::export::trace::{ExportResult, SpanData, SpanExporter};
use serde_json::Value;

use crate::error::ConfigError;

pub const DEFAULT_JAEGER_ENDPOINT: &str = "http://localhost:4318";
pub const DEFAULT_OTLP_ENDPOINT: &str = "localhost:4318";
pub const DEFAULT_OTLP_GRPC_ENDPOINT: &str = "localhost:4317";
pub const DEFAULT_EXPORT_TIMEOUT: Duration = Duration::from_secs(10);

/// Sink for the console exporter.
pub type ConsoleWriter = Box<dyn Write + Send + Sync>;

/// Endpoints and transports for every backend. Only the fields of the
/// selected backend are used.
pub struct ExporterConfig {
    pub jaeger_endpoint: String,
    pub otlp_endpoint: String,
    pub otlp_grpc_endpoint: String,
    pub export_timeout: Duration,
    /// Console sink; standard output when unset.
    pub writer: Option<ConsoleWriter>,
    /// Transport for the OTLP/HTTP backends.
    pub http_client: Option<reqwest::Client>,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            jaeger_endpoint: DEFAULT_JAEGER_ENDPOINT.to_string(),
            otlp_endpoint: DEFAULT_OTLP_ENDPOINT.to_string(),
            otlp_grpc_endpoint: DEFAULT_OTLP_GRPC_ENDPOINT.to_string(),
            export_timeout: DEFAULT_EXPORT_TIMEOUT,
            writer: None,
            http_client: None,
        }
    }
}

impl ExporterConfig {
    pub fn with_jaeger_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.jaeger_endpoint = endpoint.into();
        self
    }

    pub fn with_otlp_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.otlp_endpoint = endpoint.into();
        self
    }

    pub fn with_otlp_grpc_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.otlp_grpc_endpoint = endpoint.into();
        self
    }

    pub fn with_export_timeout(mut self, timeout: Duration) -> Self {
        self.export_timeout = timeout;
        self
    }

    pub fn with_writer(mut self, writer: ConsoleWriter) -> Self {
        self.writer = Some(writer);
        self
    }

    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }
}

impl fmt::Debug for ExporterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExporterConfig")
            .field("jaeger_endpoint", &self.jaeger_endpoint)
            .field("otlp_endpoint", &self.otlp_endpoint)
            .field("otlp_grpc_endpoint", &self.otlp_grpc_endpoint)
            .field("export_timeout", &self.export_timeout)
            .field("writer", &self.writer.is_some())
            .field("http_client", &self.http_client.is_some())
            .finish()
    }
}

/// Select and build the span exporter named `name`.
pub fn new_exporter(name: &str, config: ExporterConfig) -> Result<Exporter, ConfigError> {
    let name = name.trim().to_uppercase();
    let exporter = match name.as_str() {
        "" | "NOOP" => Exporter::Noop(NoopExporter),
        "STDOUT" => Exporter::Console(console(
            config.writer.unwrap_or_else(|| Box::new(io::stdout())),
        )),
        "JAEGER" => {
            let endpoint = required(&config.jaeger_endpoint, "JAEGER", "OTEL_EXPORTER_JAEGER_ENDPOINT")?;
            otlp_http("JAEGER", endpoint, config.export_timeout, config.http_client)?
        }
        "OTLP" => {
            let endpoint = required(&config.otlp_endpoint, "OTLP", "OTEL_EXPORTER_OTLP_ENDPOINT")?;
            otlp_http("OTLP", endpoint, config.export_timeout, config.http_client)?
        }
        "OTLP_GRPC" => {
            let endpoint = required(
                &config.otlp_grpc_endpoint,
                "OTLP_GRPC",
                "OTEL_EXPORTER_OTLP_GRPC_ENDPOINT",
            )?;
            otlp_grpc(endpoint, config.export_timeout)?
        }
        _ => return Err(ConfigError::UnknownExporter(name)),
    };

    tracing::info!(exporter = %exporter.kind(), "Span exporter selected");
    Ok(exporter)
}

/// Trimmed endpoint with a scheme, or an error if it is empty.
fn required(
    endpoint: &str,
    backend: &'static str,
    variable: &'static str,
) -> Result<String, ConfigError> {
    let endpoint = endpoint.trim();
    if endpoint.is_empty() {
        return Err(ConfigError::MissingEndpoint { backend, variable });
    }
    if endpoint.contains("://") {
        Ok(endpoint.to_string())
    } else {
        Ok(format!("http://{endpoint}"))
    }
}

fn otlp_http(
    backend: &'static str,
    endpoint: String,
    timeout: Duration,
    client: Option<reqwest::Client>,
) -> Result<Exporter, ConfigError> {
    let mut builder = opentelemetry_otlp::new_exporter()
        .http()
        .with_endpoint(endpoint)
        .with_timeout(timeout);
    if let Some(client) = client {
        builder = builder.with_http_client(client);
    }

    SpanExporterBuilder::from(builder)
        .build_span_exporter()
        .map(Exporter::Otlp)
        .map_err(|e| ConfigError::ExporterBuild {
            backend,
            reason: e.to_string(),
        })
}

fn otlp_grpc(endpoint: String, timeout: Duration) -> Result<Exporter, ConfigError> {
    let builder = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(endpoint)
        .with_timeout(timeout);

    SpanExporterBuilder::from(builder)
        .build_span_exporter()
        .map(Exporter::Otlp)
        .map_err(|e| ConfigError::ExporterBuild {
            backend: "OTLP_GRPC",
            reason: e.to_string(),
        })
}

/// The selected exporter.
#[derive(Debug)]
pub enum Exporter {
    Noop(NoopExporter),
    Console(opentelemetry_stdout::SpanExporter),
    Otlp(opentelemetry_otlp::SpanExporter),
}

impl Exporter {
    pub fn kind(&self) -> &'static str {
        match self {
            Exporter::Noop(_) => "noop",
            Exporter::Console(_) => "console",
            Exporter::Otlp(_) => "otlp",
        }
    }
}

impl SpanExporter for Exporter {
    fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
        match self {
            Exporter::Noop(e) => e.export(batch),
            Exporter::Console(e) => e.export(batch),
            Exporter::Otlp(e) => e.export(batch),
        }
    }

    fn shutdown(&mut self) {
        match self {
            Exporter::Noop(e) => e.shutdown(),
            Exporter::Console(e) => e.shutdown(),
            Exporter::Otlp(e) => e.shutdown(),
        }
    }

    fn force_flush(&mut self) -> BoxFuture<'static, ExportResult> {
        match self {
            Exporter::Noop(e) => e.force_flush(),
            Exporter::Console(e) => e.force_flush(),
            Exporter::Otlp(e) => e.force_flush(),
        }
    }

}

/// Drops every batch.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopExporter;

impl SpanExporter for NoopExporter {
    fn export(&mut self, _batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
        Box::pin(future::ready(Ok(())))
    }
}

/// Keys of the stdout encoding dropped before printing.
const TIMESTAMP_KEYS: [&str; 3] = ["startTimeUnixNano", "endTimeUnixNano", "timeUnixNano"];

/// Stdout exporter writing each batch as one pretty-printed JSON document,
/// without timestamps, into `writer`.
fn console(writer: ConsoleWriter) -> opentelemetry_stdout::SpanExporter {
    opentelemetry_stdout::SpanExporter::builder()
        .with_writer(writer)
        .with_encoder(|writer, data| {
            let mut value = serde_json::to_value(&data).map_err(|e| TraceError::Other(Box::new(e)))?;
            strip_timestamps(&mut value);
            let document =
                serde_json::to_vec_pretty(&value).map_err(|e| TraceError::Other(Box::new(e)))?;
            writer
                .write_all(&document)
                .map_err(|e| TraceError::Other(Box::new(e)))
        })
        .build()
}

fn strip_timestamps(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for key in TIMESTAMP_KEYS {
                map.remove(key);
            }
            map.values_mut().for_each(strip_timestamps);
        }
        Value::Array(items) => items.iter_mut().for_each(strip_timestamps),
        _ => {}
    }
}
