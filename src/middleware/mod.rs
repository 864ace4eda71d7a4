//! HTTP observability middleware
//!
//! Request flow through a [`Pipeline`]:
//!
//! ```text
//! trailing-slash normalization → metrics → trace context → access log → router
//! ```
//!
//! Each stage wraps the whole router as a service, so it also sees requests
//! that match no route.

pub mod access_log;
pub mod capture;
pub mod metrics;
pub mod trace_context;

pub use access_log::{
    AccessLog, AccessLogConfig, DEFAULT_MAX_BODY_LOG_BYTES, RequestFilter,
    TRUNCATED_BODY_PLACEHOLDER, skip_paths,
};
pub use metrics::{DEFAULT_METRICS_PATH, HttpMetrics, MetricsLayerConfig};
pub use trace_context::{TraceContext, TraceContextConfig};

use std::convert::Infallible;

use axum::Router;
use axum::extract::Request;
use axum::response::Response;
use tower::{Layer, Service};
use tower_http::normalize_path::NormalizePathLayer;

use crate::error::ConfigError;
use crate::observability::Observability;

/// Put `layer` in front of everything `router` serves, fallback included.
pub(crate) fn wrap<L>(router: Router, layer: L) -> Router
where
    L: Layer<Router>,
    L::Service: Service<Request, Response = Response, Error = Infallible>
        + Clone
        + Send
        + Sync
        + 'static,
    <L::Service as Service<Request>>::Future: Send + 'static,
{
    Router::new().fallback_service(layer.layer(router))
}

/// Settings for [`Pipeline::from_observability`].
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub metrics_enabled: bool,
    pub metrics_path: String,
    pub access_log_message: String,
    pub max_body_log_bytes: usize,
    /// Paths excluded from the access log.
    pub skip_paths: Vec<String>,
    pub trim_trailing_slash: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
            metrics_path: DEFAULT_METRICS_PATH.to_string(),
            access_log_message: access_log::DEFAULT_ACCESS_LOG_MESSAGE.to_string(),
            max_body_log_bytes: DEFAULT_MAX_BODY_LOG_BYTES,
            skip_paths: Vec::new(),
            trim_trailing_slash: true,
        }
    }
}

/// Ordered middleware chain. Immutable once built; absent stages are skipped.
#[derive(Clone, Default)]
pub struct Pipeline {
    trim_trailing_slash: bool,
    metrics: Option<HttpMetrics>,
    trace_context: Option<TraceContext>,
    access_log: Option<AccessLog>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_trailing_slash_trimmed(mut self, enabled: bool) -> Self {
        self.trim_trailing_slash = enabled;
        self
    }

    pub fn with_metrics(mut self, stage: HttpMetrics) -> Self {
        self.metrics = Some(stage);
        self
    }

    pub fn with_trace_context(mut self, stage: TraceContext) -> Self {
        self.trace_context = Some(stage);
        self
    }

    pub fn with_access_log(mut self, stage: AccessLog) -> Self {
        self.access_log = Some(stage);
        self
    }

    /// Build every stage from the injected logger, tracer provider and
    /// metric registry.
    pub fn from_observability(
        obs: &Observability,
        options: &PipelineOptions,
    ) -> Result<Self, ConfigError> {
        let filter = (!options.skip_paths.is_empty())
            .then(|| skip_paths(options.skip_paths.iter().cloned()));

        let access_log = AccessLog::new(AccessLogConfig {
            message: options.access_log_message.clone(),
            logger: obs.logger(),
            tracer_provider: obs.tracer_provider(),
            propagator: obs.propagator(),
            filter,
            max_body_log_bytes: options.max_body_log_bytes,
        })?;

        let trace_context = TraceContext::new(TraceContextConfig {
            tracer_provider: obs.tracer_provider(),
            propagator: obs.propagator(),
        });

        let mut pipeline = Self::new()
            .with_trailing_slash_trimmed(options.trim_trailing_slash)
            .with_trace_context(trace_context)
            .with_access_log(access_log);

        if options.metrics_enabled {
            pipeline = pipeline.with_metrics(HttpMetrics::new(MetricsLayerConfig {
                metric: Some(obs.metric()),
                logger: obs.logger(),
                path: options.metrics_path.clone(),
            })?);
        }

        tracing::debug!(
            metrics = options.metrics_enabled,
            trim_trailing_slash = options.trim_trailing_slash,
            "Middleware pipeline built"
        );
        Ok(pipeline)
    }

    /// Apply the chain to `router`. The last stage wrapped runs first.
    pub fn wrap(&self, router: Router) -> Router {
        let mut app = router;
        if let Some(stage) = &self.access_log {
            app = stage.wrap(app);
        }
        if let Some(stage) = &self.trace_context {
            app = stage.wrap(app);
        }
        if let Some(stage) = &self.metrics {
            app = stage.wrap(app);
        }
        if self.trim_trailing_slash {
            app = wrap(app, NormalizePathLayer::trim_trailing_slash());
        }
        app
    }
}
