//! Logger contract used by every middleware stage.
//!
//! Components never reach for an ambient logger: they receive an
//! `Arc<dyn Logger>` through their configuration. `TracingLogger` forwards to
//! the `tracing` macros, so output format and destination are decided by the
//! subscriber installed at startup.

use std::sync::Arc;

use opentelemetry::Context;
use opentelemetry::trace::TraceContextExt;
use serde::Serialize;
use serde_json::Value;

use super::access::AccessLogEntry;

/// Structured key-value attached to a log line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    pub key: String,
    pub value: Value,
}

/// Build a [`Field`] from anything serializable.
pub fn kv(key: impl Into<String>, value: impl Serialize) -> Field {
    Field {
        key: key.into(),
        value: serde_json::to_value(value).unwrap_or(Value::Null),
    }
}

pub trait Logger: Send + Sync {
    fn debug(&self, cx: &Context, msg: &str, fields: &[Field]);
    fn info(&self, cx: &Context, msg: &str, fields: &[Field]);
    fn warn(&self, cx: &Context, msg: &str, fields: &[Field]);
    fn error(&self, cx: &Context, msg: &str, fields: &[Field]);

    /// Emit one access-log record.
    fn access(&self, cx: &Context, msg: &str, entry: &AccessLogEntry);
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl NoopLogger {
    pub fn shared() -> Arc<dyn Logger> {
        Arc::new(NoopLogger)
    }
}

impl Logger for NoopLogger {
    fn debug(&self, _: &Context, _: &str, _: &[Field]) {}
    fn info(&self, _: &Context, _: &str, _: &[Field]) {}
    fn warn(&self, _: &Context, _: &str, _: &[Field]) {}
    fn error(&self, _: &Context, _: &str, _: &[Field]) {}
    fn access(&self, _: &Context, _: &str, _: &AccessLogEntry) {}
}

#[derive(Debug, Clone, Copy)]
enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

/// Logger backed by `tracing` events.
#[derive(Debug, Clone, Default)]
pub struct TracingLogger {
    static_fields: Vec<Field>,
}

impl TracingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a logger that appends `fields` to every line it writes.
    pub fn with_static_fields(mut self, fields: impl IntoIterator<Item = Field>) -> Self {
        self.static_fields.extend(fields);
        self
    }

    fn render_fields(&self, fields: &[Field]) -> String {
        let object: serde_json::Map<String, Value> = self
            .static_fields
            .iter()
            .chain(fields)
            .map(|f| (f.key.clone(), f.value.clone()))
            .collect();
        Value::Object(object).to_string()
    }

    fn emit(&self, level: Level, cx: &Context, msg: &str, fields: &[Field]) {
        let trace_id = trace_id(cx).unwrap_or_default();
        let fields = self.render_fields(fields);
        match level {
            Level::Debug => tracing::debug!(trace_id = %trace_id, fields = %fields, "{}", msg),
            Level::Info => tracing::info!(trace_id = %trace_id, fields = %fields, "{}", msg),
            Level::Warn => tracing::warn!(trace_id = %trace_id, fields = %fields, "{}", msg),
            Level::Error => tracing::error!(trace_id = %trace_id, fields = %fields, "{}", msg),
        }
    }
}

impl Logger for TracingLogger {
    fn debug(&self, cx: &Context, msg: &str, fields: &[Field]) {
        self.emit(Level::Debug, cx, msg, fields);
    }

    fn info(&self, cx: &Context, msg: &str, fields: &[Field]) {
        self.emit(Level::Info, cx, msg, fields);
    }

    fn warn(&self, cx: &Context, msg: &str, fields: &[Field]) {
        self.emit(Level::Warn, cx, msg, fields);
    }

    fn error(&self, cx: &Context, msg: &str, fields: &[Field]) {
        self.emit(Level::Error, cx, msg, fields);
    }

    fn access(&self, cx: &Context, msg: &str, entry: &AccessLogEntry) {
        let status_code = entry
            .response
            .as_ref()
            .and_then(|r| r.status_code)
            .unwrap_or_default();
        let access_log = serde_json::to_string(entry).unwrap_or_default();

        tracing::info!(
            log_type = "access",
            trace_id = %trace_id(cx).unwrap_or_default(),
            method = %entry.method,
            path = %entry.path,
            status_code = status_code,
            elapsed_time_ns = entry.elapsed_time_ns,
            fields = %self.render_fields(&[]),
            access_log = %access_log,
            "{}",
            msg
        );
    }
}

/// Hex trace id of the span active in `cx`, if any.
pub fn trace_id(cx: &Context) -> Option<String> {
    let span = cx.span();
    let span_context = span.span_context();
    if span_context.is_valid() {
        Some(format!("{:032x}", span_context.trace_id()))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::access::HttpData;
    use opentelemetry::trace::{SpanContext, SpanId, TraceFlags, TraceId, TraceState};
    use tracing_test::traced_test;

    fn remote_context() -> Context {
        let span_context = SpanContext::new(
            TraceId::from_hex("4bf92f3577b34da6a3ce929d0e0e4736").unwrap(),
            SpanId::from_hex("00f067aa0ba902b7").unwrap(),
            TraceFlags::SAMPLED,
            true,
            TraceState::default(),
        );
        Context::new().with_remote_span_context(span_context)
    }

    #[test]
    fn test_kv_serializes_values() {
        assert_eq!(kv("bytes", 12).value, serde_json::json!(12));
        assert_eq!(kv("error", "boom").value, serde_json::json!("boom"));
    }

    #[test]
    fn test_trace_id_from_context() {
        assert_eq!(trace_id(&Context::new()), None);
        assert_eq!(
            trace_id(&remote_context()).as_deref(),
            Some("4bf92f3577b34da6a3ce929d0e0e4736")
        );
    }

    #[traced_test]
    #[test]
    fn test_tracing_logger_levels_and_static_fields() {
        let logger = TracingLogger::new().with_static_fields([kv("service", "orders")]);
        logger.warn(&remote_context(), "disk almost full", &[kv("free_bytes", 42)]);

        assert!(logs_contain("disk almost full"));
        assert!(logs_contain("4bf92f3577b34da6a3ce929d0e0e4736"));
        assert!(logs_contain(r#""service":"orders""#));
        assert!(logs_contain(r#""free_bytes":42"#));
    }

    #[traced_test]
    #[test]
    fn test_tracing_logger_access_record() {
        let entry = AccessLogEntry {
            method: "GET".to_string(),
            path: "/ping".to_string(),
            response: Some(HttpData {
                status_code: Some(200),
                ..Default::default()
            }),
            elapsed_time_ns: 1500,
            ..Default::default()
        };

        TracingLogger::new().access(&Context::new(), "incoming request log", &entry);

        assert!(logs_contain("incoming request log"));
        assert!(logs_contain("status_code=200"));
        assert!(logs_contain("elapsed_time_ns=1500"));
    }

    #[test]
    fn test_noop_logger_accepts_everything() {
        let logger = NoopLogger::shared();
        logger.error(&Context::new(), "ignored", &[kv("k", "v")]);
        logger.access(&Context::new(), "ignored", &AccessLogEntry::default());
    }
}
