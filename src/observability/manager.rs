//! Observability manager
//!
//! Bundles the logger, tracer provider and metric registry that the pipeline
//! stages receive. Anything not supplied defaults to a no-op implementation.

use std::sync::Arc;

use opentelemetry_sdk::trace as sdktrace;

use super::metrics::{Metric, NoopMetric};
use super::trace::{
    PipelineTracer, SharedPropagator, SharedTracerProvider, composite_propagator, noop_tracer_provider,
    pipeline_tracer, shared_tracer_provider, shutdown_tracer_provider,
};
use crate::error::MetricsError;
use crate::logging::{Logger, NoopLogger};

#[derive(Clone)]
pub struct Observability {
    logger: Arc<dyn Logger>,
    tracer_provider: SharedTracerProvider,
    sdk_provider: Option<sdktrace::TracerProvider>,
    propagator: SharedPropagator,
    metric: Arc<dyn Metric>,
}

impl Default for Observability {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Observability {
    pub fn builder() -> ObservabilityBuilder {
        ObservabilityBuilder::default()
    }

    pub fn logger(&self) -> Arc<dyn Logger> {
        self.logger.clone()
    }

    pub fn tracer_provider(&self) -> SharedTracerProvider {
        self.tracer_provider.clone()
    }

    pub fn tracer(&self) -> PipelineTracer {
        pipeline_tracer(&self.tracer_provider)
    }

    pub fn propagator(&self) -> SharedPropagator {
        self.propagator.clone()
    }

    pub fn metric(&self) -> Arc<dyn Metric> {
        self.metric.clone()
    }

    /// Flush buffered spans, then close the metric registry.
    pub fn shutdown(&self) -> Result<(), MetricsError> {
        if let Some(provider) = &self.sdk_provider {
            shutdown_tracer_provider(provider);
        }
        self.metric.close()
    }
}

#[derive(Default)]
pub struct ObservabilityBuilder {
    logger: Option<Arc<dyn Logger>>,
    tracer_provider: Option<SharedTracerProvider>,
    sdk_provider: Option<sdktrace::TracerProvider>,
    propagator: Option<SharedPropagator>,
    metric: Option<Arc<dyn Metric>>,
}

impl ObservabilityBuilder {
    pub fn logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Use an SDK provider; it is flushed by [`Observability::shutdown`].
    pub fn tracer_provider(mut self, provider: sdktrace::TracerProvider) -> Self {
        self.tracer_provider = Some(shared_tracer_provider(provider.clone()));
        self.sdk_provider = Some(provider);
        self
    }

    /// Use an already type-erased provider. It is not flushed on shutdown.
    pub fn shared_tracer_provider(mut self, provider: SharedTracerProvider) -> Self {
        self.tracer_provider = Some(provider);
        self.sdk_provider = None;
        self
    }

    pub fn propagator(mut self, propagator: SharedPropagator) -> Self {
        self.propagator = Some(propagator);
        self
    }

    pub fn metric(mut self, metric: Arc<dyn Metric>) -> Self {
        self.metric = Some(metric);
        self
    }

    pub fn build(self) -> Observability {
        Observability {
            logger: self.logger.unwrap_or_else(NoopLogger::shared),
            tracer_provider: self.tracer_provider.unwrap_or_else(noop_tracer_provider),
            sdk_provider: self.sdk_provider,
            propagator: self.propagator.unwrap_or_else(composite_propagator),
            metric: self.metric.unwrap_or_else(NoopMetric::shared),
        }
    }
}
