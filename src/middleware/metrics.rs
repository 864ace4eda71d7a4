//! HTTP request metrics middleware
//!
//! Counts every request and records its latency, labeled by the observed
//! status code, method and path. Both are recorded once the response body has
//! been written. The exposition path is answered directly from the registry's
//! handler and is never counted.

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::{Request, State};
use axum::middleware::{Next, from_fn_with_state};
use axum::response::Response;
use opentelemetry::Context;

use super::capture::on_complete;
use super::wrap;
use crate::error::ConfigError;
use crate::logging::{Logger, NoopLogger, kv};
use crate::observability::metrics::{Metric, MetricsHandler, StatCounterVec, StatTimerVec};

pub const DEFAULT_METRICS_PATH: &str = "/metrics";
pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
pub const HTTP_REQUESTS_DURATION: &str = "http_requests_duration";
pub const HTTP_LABELS: [&str; 3] = ["code", "method", "path"];

pub struct MetricsLayerConfig {
    /// Registry to record into. Required.
    pub metric: Option<Arc<dyn Metric>>,
    pub logger: Arc<dyn Logger>,
    /// Path answered with the exposition text.
    pub path: String,
}

impl Default for MetricsLayerConfig {
    fn default() -> Self {
        Self {
            metric: None,
            logger: NoopLogger::shared(),
            path: DEFAULT_METRICS_PATH.to_string(),
        }
    }
}

struct MetricsState {
    handler: MetricsHandler,
    requests: Arc<dyn StatCounterVec>,
    duration: Arc<dyn StatTimerVec>,
    logger: Arc<dyn Logger>,
    path: String,
}

/// The metrics stage.
#[derive(Clone)]
pub struct HttpMetrics {
    state: Arc<MetricsState>,
}

impl HttpMetrics {
    /// Fails if no registry is given or the registry cannot be exposed.
    pub fn new(config: MetricsLayerConfig) -> Result<Self, ConfigError> {
        let metric = config.metric.ok_or_else(|| {
            ConfigError::MissingRegisterer("metric registry is not set".to_string())
        })?;
        let handler = metric
            .handler()
            .ok_or_else(|| ConfigError::MissingGatherer(config.path.clone()))?;
        if !config.path.starts_with('/') {
            return Err(ConfigError::InvalidOption {
                option: "path",
                reason: format!("'{}' must start with '/'", config.path),
            });
        }

        let requests = metric.try_counter_vec(HTTP_REQUESTS_TOTAL, &HTTP_LABELS)?;
        let duration = metric.try_timer_vec(HTTP_REQUESTS_DURATION, &HTTP_LABELS)?;

        Ok(Self {
            state: Arc::new(MetricsState {
                handler,
                requests,
                duration,
                logger: config.logger,
                path: config.path,
            }),
        })
    }

    pub fn wrap(&self, router: Router) -> Router {
        wrap(router, from_fn_with_state(self.state.clone(), http_metrics))
    }
}

async fn http_metrics(
    State(state): State<Arc<MetricsState>>,
    req: Request,
    next: Next,
) -> Response {
    if req.uri().path() == state.path {
        return state.handler.respond();
    }

    let start = Instant::now();
    let method = req.method().to_string();
    let path = req.uri().path().to_string();

    let (parts, body) = next.run(req).await.into_parts();
    let code = parts.status.as_u16().to_string();
    let cx = Context::current();

    let body = on_complete(body, move |err| {
        if let Some(err) = err {
            state.logger.error(
                &cx,
                "metrics middleware writing response body error",
                &[kv("error", err), kv("path", &path)],
            );
        }

        let labels = [code.as_str(), method.as_str(), path.as_str()];
        state.requests.with_values(&labels).incr(1);
        state.duration.with_values(&labels).record(start.elapsed());
    });

    Response::from_parts(parts, body)
}
