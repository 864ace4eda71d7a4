//! Observability building blocks
//!
//! - `metrics`: label-consistent metric registry with Prometheus, no-op and
//!   fan-out backends
//! - `exporter`: span exporter selection by backend name
//! - `trace`: tracer provider lifecycle, propagation and span guards
//! - `manager`: the injected bundle the middleware is built from

pub mod exporter;
pub mod manager;
pub mod metrics;
pub mod trace;

#[cfg(test)]
pub(crate) mod test_support;

pub use exporter::{Exporter, ExporterConfig, new_exporter};
pub use manager::{Observability, ObservabilityBuilder};
pub use trace::{
    PipelineTracer, RequestContext, SharedPropagator, SharedTracerProvider, SpanGuard, TracingSettings,
    build_tracer_provider, composite_propagator, noop_tracer_provider, pipeline_tracer,
    shared_tracer_provider, shutdown_tracer_provider,
};
