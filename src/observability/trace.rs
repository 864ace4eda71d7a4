//! Tracer provider lifecycle and trace-context propagation
//!
//! Middleware never reads the process-global OpenTelemetry provider. It gets a
//! [`SharedTracerProvider`] injected and opens spans through [`SpanGuard`],
//! which ends its span when dropped, including during a panic unwind.

use std::borrow::Cow;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use opentelemetry::global::BoxedTracer;
use opentelemetry::propagation::{
    Extractor, Injector, TextMapCompositePropagator, TextMapPropagator,
};
use opentelemetry::trace::noop::NoopTracer;
use opentelemetry::trace::{Status, TraceContextExt, Tracer, TracerProvider as _};
use opentelemetry::{Context, KeyValue};
use opentelemetry_sdk::propagation::{BaggagePropagator, TraceContextPropagator};
use opentelemetry_sdk::trace::{self as sdktrace, Sampler};
use opentelemetry_sdk::{Resource, runtime};

use super::exporter::Exporter;

/// Tracer provider handed to the middleware stages. Either records nothing
/// or shares an SDK provider; cloning shares the same provider.
#[derive(Clone, Default)]
pub struct SharedTracerProvider {
    sdk: Option<sdktrace::TracerProvider>,
}

impl SharedTracerProvider {
    pub fn noop() -> Self {
        Self { sdk: None }
    }

    pub fn sdk(provider: sdktrace::TracerProvider) -> Self {
        Self {
            sdk: Some(provider),
        }
    }

    /// Tracer of the pipeline's instrumentation scope. The tracer holds a
    /// handle to the provider so spans stay recorded for as long as it lives.
    pub fn tracer(&self) -> PipelineTracer {
        let tracer = match &self.sdk {
            Some(sdk) => BoxedTracer::new(Box::new(sdk.tracer(INSTRUMENTATION_NAME))),
            None => BoxedTracer::new(Box::new(NoopTracer::new())),
        };
        PipelineTracer {
            tracer,
            provider: self.clone(),
        }
    }
}

impl fmt::Debug for SharedTracerProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedTracerProvider")
            .field("recording", &self.sdk.is_some())
            .finish()
    }
}

/// A [`BoxedTracer`] that keeps its provider alive.
pub struct PipelineTracer {
    tracer: BoxedTracer,
    provider: SharedTracerProvider,
}

impl Deref for PipelineTracer {
    type Target = BoxedTracer;

    fn deref(&self) -> &BoxedTracer {
        &self.tracer
    }
}

impl fmt::Debug for PipelineTracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PipelineTracer").field(&self.provider).finish()
    }
}

/// Propagator shared by the middleware stages.
pub type SharedPropagator = Arc<dyn TextMapPropagator + Send + Sync>;

/// Instrumentation scope name of spans opened by the pipeline.
pub const INSTRUMENTATION_NAME: &str = env!("CARGO_PKG_NAME");

/// Resource and sampling settings for [`build_tracer_provider`].
#[derive(Debug, Clone)]
pub struct TracingSettings {
    pub service_name: String,
    pub service_version: String,
    pub environment: String,
    /// Ratio of new root traces that are sampled, 0.0..=1.0.
    pub sample_rate: f64,
}

impl Default for TracingSettings {
    fn default() -> Self {
        Self {
            service_name: env!("CARGO_PKG_NAME").to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: "development".to_string(),
            sample_rate: 1.0,
        }
    }
}

/// Provider that records nothing.
pub fn noop_tracer_provider() -> SharedTracerProvider {
    SharedTracerProvider::noop()
}

/// Wrap a concrete provider for injection into the middleware.
pub fn shared_tracer_provider(provider: sdktrace::TracerProvider) -> SharedTracerProvider {
    SharedTracerProvider::sdk(provider)
}

/// Build a provider that batches spans to `exporter` on the Tokio runtime.
/// Sampling respects the parent's decision and falls back to `sample_rate`
/// for new traces.
pub fn build_tracer_provider(
    exporter: Exporter,
    settings: &TracingSettings,
) -> sdktrace::TracerProvider {
    let sampler = Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(
        settings.sample_rate,
    )));

    let provider = sdktrace::TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_config(
            sdktrace::config()
                .with_sampler(sampler)
                .with_resource(Resource::new(vec![
                    KeyValue::new("service.name", settings.service_name.clone()),
                    KeyValue::new("service.version", settings.service_version.clone()),
                    KeyValue::new("deployment.environment", settings.environment.clone()),
                ])),
        )
        .build();

    tracing::info!(
        service = %settings.service_name,
        sample_rate = %settings.sample_rate,
        "Tracer provider initialized"
    );
    provider
}

/// Flush buffered spans. Call once, at process shutdown.
pub fn shutdown_tracer_provider(provider: &sdktrace::TracerProvider) {
    for result in provider.force_flush() {
        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to flush spans");
        }
    }
    tracing::info!("Tracer provider flushed");
}

/// W3C trace-context plus baggage.
pub fn composite_propagator() -> SharedPropagator {
    Arc::new(TextMapCompositePropagator::new(vec![
        Box::new(TraceContextPropagator::new()),
        Box::new(BaggagePropagator::new()),
    ]))
}

pub struct HeaderExtractor<'a>(pub &'a HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|k| k.as_str()).collect()
    }
}

pub struct HeaderInjector<'a>(pub &'a mut HeaderMap);

impl Injector for HeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        if let (Ok(name), Ok(val)) = (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            self.0.insert(name, val);
        }
    }
}

pub fn extract_context(propagator: &dyn TextMapPropagator, headers: &HeaderMap) -> Context {
    propagator.extract(&HeaderExtractor(headers))
}

pub fn inject_context(propagator: &dyn TextMapPropagator, cx: &Context, headers: &mut HeaderMap) {
    propagator.inject_context(cx, &mut HeaderInjector(headers));
}

/// Request extension carrying the trace context set by the propagation
/// stage. Later stages open their spans as children of it.
#[derive(Debug, Clone)]
pub struct RequestContext(pub Context);

/// An open span that ends when the guard is dropped.
#[must_use = "the span ends as soon as the guard is dropped"]
pub struct SpanGuard {
    cx: Context,
}

impl SpanGuard {
    pub fn start(
        tracer: &BoxedTracer,
        name: impl Into<Cow<'static, str>>,
        parent: &Context,
    ) -> Self {
        let span = tracer.start_with_context(name, parent);
        Self {
            cx: parent.with_span(span),
        }
    }

    /// Context with this span active.
    pub fn context(&self) -> &Context {
        &self.cx
    }

    pub fn set_attribute(&self, attribute: KeyValue) {
        self.cx.span().set_attribute(attribute);
    }

    /// Mark the span failed.
    pub fn record_error(&self, message: impl Into<String>) {
        let message = message.into();
        let span = self.cx.span();
        span.add_event(
            "exception",
            vec![KeyValue::new("exception.message", message.clone())],
        );
        span.set_status(Status::error(message));
    }
}

impl Drop for SpanGuard {
    fn drop(&mut self) {
        self.cx.span().end();
    }
}

/// Tracer of the pipeline's instrumentation scope.
pub fn pipeline_tracer(provider: &SharedTracerProvider) -> PipelineTracer {
    provider.tracer()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::test_support::collecting_provider;
    use opentelemetry::baggage::BaggageExt;
    use opentelemetry::trace::SpanId;

    const TRACEPARENT: &str = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";

    #[test]
    fn test_extract_and_inject_round_trip() {
        let propagator = composite_propagator();
        let mut inbound = HeaderMap::new();
        inbound.insert("traceparent", HeaderValue::from_static(TRACEPARENT));
        inbound.insert("baggage", HeaderValue::from_static("tenant=acme"));

        let cx = extract_context(propagator.as_ref(), &inbound);
        assert_eq!(
            cx.span().span_context().trace_id().to_string(),
            "4bf92f3577b34da6a3ce929d0e0e4736"
        );
        assert_eq!(
            cx.baggage().get("tenant").map(|v| v.to_string()),
            Some("acme".to_string())
        );

        let mut outbound = HeaderMap::new();
        inject_context(propagator.as_ref(), &cx, &mut outbound);
        assert_eq!(outbound.get("traceparent").unwrap(), TRACEPARENT);
        assert!(outbound.get("baggage").unwrap().to_str().unwrap().contains("tenant=acme"));
    }

    #[test]
    fn test_guard_ends_span_once_and_nests() {
        let (provider, spans) = collecting_provider();
        let tracer = pipeline_tracer(&provider);

        {
            let parent = SpanGuard::start(&tracer, "parent", &Context::new());
            let child = SpanGuard::start(&tracer, "child", parent.context());
            child.record_error("boom");
        }

        let spans = spans.finished();
        assert_eq!(spans.len(), 2);
        let child = spans.iter().find(|s| s.name == "child").unwrap();
        let parent = spans.iter().find(|s| s.name == "parent").unwrap();
        assert_eq!(child.parent_span_id, parent.span_context.span_id());
        assert_eq!(parent.parent_span_id, SpanId::INVALID);
        assert!(matches!(child.status, Status::Error { .. }));
    }

    #[test]
    fn test_guard_ends_span_on_panic() {
        let (provider, spans) = collecting_provider();
        let tracer = pipeline_tracer(&provider);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = SpanGuard::start(&tracer, "doomed", &Context::new());
            panic!("handler exploded");
        }));

        assert!(result.is_err());
        assert_eq!(spans.finished().len(), 1);
    }

    #[test]
    fn test_tracer_outlives_dropped_provider_handle() {
        let (provider, spans) = collecting_provider();
        let tracer = pipeline_tracer(&provider);
        drop(provider);

        let guard = SpanGuard::start(&tracer, "late", &Context::new());
        assert!(guard.context().span().span_context().is_valid());
        drop(guard);
        assert_eq!(spans.finished().len(), 1);
    }

    #[test]
    fn test_noop_provider_produces_invalid_spans() {
        let tracer = pipeline_tracer(&noop_tracer_provider());
        let guard = SpanGuard::start(&tracer, "ignored", &Context::new());
        assert!(!guard.context().span().span_context().is_valid());
    }
}
