use axum::{
    Extension, Json, Router,
    extract::State,
    routing::get,
};
use chrono::{DateTime, Utc};
use opentelemetry::Context;
use serde::Serialize;
use tracing::debug;

use super::SystemState;
use crate::observability::{RequestContext, SpanGuard, pipeline_tracer};

#[derive(Debug, Serialize)]
pub struct PingResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_time: Option<DateTime<Utc>>,
    pub startup_time: DateTime<Utc>,
    pub uptime_ns: i64,
    pub uptime: String,
}

/// Liveness check at /ping, with build and uptime details.
///
/// Opens a "Ping Handler" span under whatever span the pipeline handed in.
pub async fn ping_handler(
    State(state): State<SystemState>,
    parent: Option<Extension<RequestContext>>,
) -> Json<PingResponse> {
    let parent = parent
        .map(|Extension(RequestContext(cx))| cx)
        .unwrap_or_else(Context::current);
    let _span = SpanGuard::start(&pipeline_tracer(&state.tracer_provider), "Ping Handler", &parent);

    let uptime = Utc::now().signed_duration_since(state.build.startup_time);
    let uptime_ns = uptime.num_nanoseconds().unwrap_or(i64::MAX);
    debug!(uptime_ns, "Ping requested");

    Json(PingResponse {
        ok: true,
        commit_hash: state.build.commit_hash.clone(),
        build_time: state.build.build_time,
        startup_time: state.build.startup_time,
        uptime_ns,
        uptime: format!("{:?}", uptime.to_std().unwrap_or_default()),
    })
}

/// System routes, ready to be merged into the application router.
pub fn routes(state: SystemState) -> Router {
    Router::new()
        .route("/ping", get(ping_handler))
        .with_state(state)
}
