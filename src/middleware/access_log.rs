//! Access-log capture middleware
//!
//! Emits exactly one [`AccessLogEntry`] per request while the client receives
//! the handler's status, headers and body unchanged. The request body is
//! drained and replayed so the handler reads an identical byte stream,
//! including a read error after the bytes that preceded it. The response is
//! recorded in memory before it is passed on; the entry is emitted after the
//! body has been written, so write failures and early disconnects show up in
//! its `error` field.
//!
//! Spans opened here are children of the propagation stage's span when one
//! is present, and end on every exit path through [`SpanGuard`]. Without a
//! propagation stage in front, this stage writes the propagation headers.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::{Request, State};
use axum::middleware::{Next, from_fn_with_state};
use axum::response::Response;
use futures::FutureExt as _;
use opentelemetry::trace::FutureExt as _;
use opentelemetry::KeyValue;
use serde_json::Value;

use super::capture::{buffer_body, join_errors, on_complete, request_host};
use super::wrap;
use crate::error::ConfigError;
use crate::logging::{AccessLogEntry, HttpData, Logger, NoopLogger, captured_body};
use crate::observability::trace::{
    PipelineTracer, RequestContext, SharedPropagator, SharedTracerProvider, SpanGuard,
    composite_propagator, extract_context, inject_context, noop_tracer_provider, pipeline_tracer,
};

/// Logged response bodies at or above this size are replaced by
/// [`TRUNCATED_BODY_PLACEHOLDER`]. The client always receives every byte.
pub const DEFAULT_MAX_BODY_LOG_BYTES: usize = 1_000_000;

pub const TRUNCATED_BODY_PLACEHOLDER: &str = "response body too large to be logged";

pub const DEFAULT_ACCESS_LOG_MESSAGE: &str = "request logger";

/// Decides whether a request is logged. `false` bypasses all capture.
pub type RequestFilter = Arc<dyn Fn(&Request) -> bool + Send + Sync>;

/// Filter that skips the given paths, e.g. health and exposition endpoints.
pub fn skip_paths<I, S>(paths: I) -> RequestFilter
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let paths: Vec<String> = paths.into_iter().map(Into::into).collect();
    Arc::new(move |req: &Request| !paths.iter().any(|p| p == req.uri().path()))
}

pub struct AccessLogConfig {
    /// Message of every access-log line.
    pub message: String,
    pub logger: Arc<dyn Logger>,
    pub tracer_provider: SharedTracerProvider,
    pub propagator: SharedPropagator,
    pub filter: Option<RequestFilter>,
    pub max_body_log_bytes: usize,
}

impl Default for AccessLogConfig {
    fn default() -> Self {
        Self {
            message: DEFAULT_ACCESS_LOG_MESSAGE.to_string(),
            logger: NoopLogger::shared(),
            tracer_provider: noop_tracer_provider(),
            propagator: composite_propagator(),
            filter: None,
            max_body_log_bytes: DEFAULT_MAX_BODY_LOG_BYTES,
        }
    }
}

impl fmt::Debug for AccessLogConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessLogConfig")
            .field("message", &self.message)
            .field("filter", &self.filter.is_some())
            .field("max_body_log_bytes", &self.max_body_log_bytes)
            .finish_non_exhaustive()
    }
}

struct AccessLogState {
    message: String,
    logger: Arc<dyn Logger>,
    tracer: PipelineTracer,
    propagator: SharedPropagator,
    filter: Option<RequestFilter>,
    max_body_log_bytes: usize,
}

/// The access-log stage.
#[derive(Clone)]
pub struct AccessLog {
    state: Arc<AccessLogState>,
}

impl AccessLog {
    pub fn new(config: AccessLogConfig) -> Result<Self, ConfigError> {
        if config.max_body_log_bytes == 0 {
            return Err(ConfigError::InvalidOption {
                option: "max_body_log_bytes",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            state: Arc::new(AccessLogState {
                message: config.message,
                logger: config.logger,
                tracer: pipeline_tracer(&config.tracer_provider),
                propagator: config.propagator,
                filter: config.filter,
                max_body_log_bytes: config.max_body_log_bytes,
            }),
        })
    }

    pub fn wrap(&self, router: Router) -> Router {
        wrap(router, from_fn_with_state(self.state.clone(), access_log))
    }
}

async fn access_log(
    State(state): State<Arc<AccessLogState>>,
    req: Request,
    next: Next,
) -> Response {
    if let Some(filter) = &state.filter {
        if !filter(&req) {
            return next.run(req).await;
        }
    }

    let start = Instant::now();
    // Under a propagation stage that stage owns the outbound headers.
    let (parent, inject) = match req.extensions().get::<RequestContext>() {
        Some(RequestContext(cx)) => (cx.clone(), false),
        None => (extract_context(state.propagator.as_ref(), req.headers()), true),
    };

    let (mut parts, body) = req.into_parts();
    let method = parts.method.to_string();
    let path = parts.uri.path().to_string();
    let host = request_host(&parts);

    let span = SpanGuard::start(&state.tracer, format!("{method} {path} [access log]"), &parent);
    span.set_attribute(KeyValue::new("http.method", method.clone()));
    span.set_attribute(KeyValue::new("http.target", path.clone()));

    let mut errors = Vec::new();
    let request = {
        let read_span = SpanGuard::start(&state.tracer, "capture request", span.context());
        let captured = buffer_body(body).await;
        if let Some(err) = captured.error_message() {
            read_span.record_error(err.clone());
            errors.push(format!("read request body: {err}"));
        }
        captured
    };
    let request_data = HttpData::request(&parts.headers, &request.bytes);

    // Downstream spans nest under the access-log span.
    parts
        .extensions
        .insert(RequestContext(span.context().clone()));
    let req = Request::from_parts(parts, request.replay());

    let outcome = AssertUnwindSafe(next.run(req).with_context(span.context().clone()))
        .catch_unwind()
        .await;

    let response = match outcome {
        Ok(response) => response,
        Err(panic) => {
            let reason = panic_message(panic.as_ref());
            span.record_error(format!("handler panicked: {reason}"));
            errors.push(format!("handler panicked: {reason}"));

            let entry = AccessLogEntry {
                method,
                host,
                path,
                request: Some(request_data),
                response: None,
                error: join_errors(&errors),
                elapsed_time_ns: elapsed_ns(start),
            };
            state.logger.access(span.context(), &state.message, &entry);
            std::panic::resume_unwind(panic);
        }
    };

    let response_span = SpanGuard::start(&state.tracer, "capture response", span.context());
    let (mut parts, body) = response.into_parts();
    let captured = buffer_body(body).await;
    if let Some(err) = captured.error_message() {
        response_span.record_error(err.clone());
        errors.push(format!("read response body: {err}"));
    }
    if inject {
        inject_context(state.propagator.as_ref(), span.context(), &mut parts.headers);
    }

    let logged_body = if captured.bytes.len() >= state.max_body_log_bytes {
        Some(Value::String(TRUNCATED_BODY_PLACEHOLDER.to_string()))
    } else {
        captured_body(&captured.bytes)
    };
    let response_data = HttpData::response(parts.status.as_u16(), &parts.headers, logged_body);
    span.set_attribute(KeyValue::new(
        "http.status_code",
        i64::from(parts.status.as_u16()),
    ));

    let mut entry = AccessLogEntry {
        method,
        host,
        path,
        request: Some(request_data),
        response: Some(response_data),
        error: None,
        elapsed_time_ns: 0,
    };

    // The entry is emitted once the client has the body, or has gone away.
    let body = on_complete(captured.replay(), move |write_err| {
        if let Some(err) = write_err {
            response_span.record_error(format!("write response body: {err}"));
            errors.push(format!("write response body: {err}"));
        }
        drop(response_span);

        entry.error = join_errors(&errors);
        entry.elapsed_time_ns = elapsed_ns(start);
        state.logger.access(span.context(), &state.message, &entry);
    });

    Response::from_parts(parts, body)
}

fn elapsed_ns(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_nanos())
        .unwrap_or(u64::MAX)
        .max(1)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
