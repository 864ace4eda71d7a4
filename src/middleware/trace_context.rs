//! Distributed tracing middleware for HTTP requests
//!
//! Continues the trace carried by the inbound `traceparent`/`baggage`
//! headers (or starts a new one) with a span named `METHOD /path`. The span
//! is injected into the outbound headers before the handler runs and handed
//! to later stages through [`RequestContext`]. It ends once the response body
//! has been written.
//!
//! This is the only stage that writes propagation headers when the pipeline
//! is assembled, so responses carry the `METHOD /path` span.

use std::sync::Arc;

use axum::Router;
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::{Next, from_fn_with_state};
use axum::response::Response;
use opentelemetry::KeyValue;
use opentelemetry::trace::FutureExt as _;

use super::capture::on_complete;
use super::wrap;
use crate::observability::trace::{
    PipelineTracer, RequestContext, SharedPropagator, SharedTracerProvider, SpanGuard,
    composite_propagator, extract_context, inject_context, noop_tracer_provider, pipeline_tracer,
};

pub struct TraceContextConfig {
    pub tracer_provider: SharedTracerProvider,
    pub propagator: SharedPropagator,
}

impl Default for TraceContextConfig {
    fn default() -> Self {
        Self {
            tracer_provider: noop_tracer_provider(),
            propagator: composite_propagator(),
        }
    }
}

struct TraceState {
    tracer: PipelineTracer,
    propagator: SharedPropagator,
}

/// The trace propagation stage.
#[derive(Clone)]
pub struct TraceContext {
    state: Arc<TraceState>,
}

impl TraceContext {
    pub fn new(config: TraceContextConfig) -> Self {
        Self {
            state: Arc::new(TraceState {
                tracer: pipeline_tracer(&config.tracer_provider),
                propagator: config.propagator,
            }),
        }
    }

    pub fn wrap(&self, router: Router) -> Router {
        wrap(router, from_fn_with_state(self.state.clone(), trace_context))
    }
}

async fn trace_context(
    State(state): State<Arc<TraceState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let parent = extract_context(state.propagator.as_ref(), req.headers());
    let name = format!("{} {}", req.method(), req.uri().path());

    let span = SpanGuard::start(&state.tracer, name, &parent);
    span.set_attribute(KeyValue::new("http.method", req.method().to_string()));
    span.set_attribute(KeyValue::new("http.target", req.uri().path().to_string()));

    let mut outbound = HeaderMap::new();
    inject_context(state.propagator.as_ref(), span.context(), &mut outbound);

    req.extensions_mut()
        .insert(RequestContext(span.context().clone()));
    let mut response = next.run(req).with_context(span.context().clone()).await;

    let status = response.status();
    span.set_attribute(KeyValue::new("http.status_code", i64::from(status.as_u16())));
    if status.is_server_error() {
        span.record_error(status.to_string());
    }

    // Headers set by the handler take precedence.
    let headers = response.headers_mut();
    for (name, value) in &outbound {
        if !headers.contains_key(name) {
            headers.insert(name.clone(), value.clone());
        }
    }

    let (parts, body) = response.into_parts();
    let body = on_complete(body, move |err| {
        if let Some(err) = err {
            span.record_error(format!("write response body: {err}"));
        }
    });
    Response::from_parts(parts, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::test_support::collecting_provider;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request as HttpRequest, StatusCode};
    use axum::routing::get;
    use opentelemetry::trace::{SpanId, Status};
    use tower::ServiceExt;

    const TRACEPARENT: &str = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";

    fn app(provider: SharedTracerProvider) -> Router {
        TraceContext::new(TraceContextConfig {
            tracer_provider: provider,
            ..Default::default()
        })
        .wrap(
            Router::new()
                .route("/orders", get(|| async { "ok" }))
                .route("/fail", get(|| async { StatusCode::BAD_GATEWAY })),
        )
    }

    #[tokio::test]
    async fn test_continues_inbound_trace() {
        let (provider, spans) = collecting_provider();
        let response = app(provider)
            .oneshot(
                HttpRequest::get("/orders")
                    .header("traceparent", TRACEPARENT)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let traceparent = response.headers().get("traceparent").unwrap().to_str().unwrap();
        assert!(traceparent.starts_with("00-4bf92f3577b34da6a3ce929d0e0e4736-"));
        assert!(!traceparent.contains("00f067aa0ba902b7"));
        assert!(spans.finished().is_empty());

        to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let spans = spans.finished();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].name, "GET /orders");
        assert_eq!(spans[0].parent_span_id, SpanId::from_hex("00f067aa0ba902b7").unwrap());
    }

    #[tokio::test]
    async fn test_starts_new_trace_without_headers() {
        let (provider, spans) = collecting_provider();
        let response = app(provider)
            .oneshot(HttpRequest::get("/orders").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert!(response.headers().contains_key("traceparent"));
        drop(response);
        assert_eq!(spans.finished()[0].parent_span_id, SpanId::INVALID);
    }

    #[tokio::test]
    async fn test_server_errors_mark_span() {
        let (provider, spans) = collecting_provider();
        let response = app(provider)
            .oneshot(HttpRequest::get("/fail").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(matches!(spans.finished()[0].status, Status::Error { .. }));
    }

    #[tokio::test]
    async fn test_unmatched_routes_are_traced() {
        let (provider, spans) = collecting_provider();
        let response = app(provider)
            .oneshot(HttpRequest::get("/missing").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().contains_key("traceparent"));
        to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(spans.finished()[0].name, "GET /missing");
    }

    #[tokio::test]
    async fn test_dropped_response_marks_span() {
        let (provider, spans) = collecting_provider();
        let response = app(provider)
            .oneshot(HttpRequest::get("/orders").body(Body::empty()).unwrap())
            .await
            .unwrap();
        drop(response);

        let spans = spans.finished();
        assert_eq!(spans.len(), 1);
        match &spans[0].status {
            Status::Error { description } => {
                assert!(description.contains("before the response body was written"))
            }
            other => panic!("unexpected status {other:?}"),
        }
    }
}
