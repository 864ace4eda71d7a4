pub mod handlers;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::observability::{SharedTracerProvider, noop_tracer_provider};

pub use handlers::{ping_handler, routes};

/// Build metadata reported by `/ping`.
///
/// `BUILD_COMMIT_ID` and `BUILD_TIME` (RFC 3339) are read at compile time when set.
#[derive(Debug, Clone, Serialize)]
pub struct BuildInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_time: Option<DateTime<Utc>>,
    pub startup_time: DateTime<Utc>,
}

impl BuildInfo {
    pub fn from_build_env() -> Self {
        let build_time = option_env!("BUILD_TIME")
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.with_timezone(&Utc));
        Self {
            commit_hash: option_env!("BUILD_COMMIT_ID").map(str::to_string),
            build_time,
            startup_time: Utc::now(),
        }
    }
}

impl Default for BuildInfo {
    fn default() -> Self {
        Self::from_build_env()
    }
}

/// State shared by the system handlers.
#[derive(Clone)]
pub struct SystemState {
    pub build: BuildInfo,
    pub tracer_provider: SharedTracerProvider,
}

impl SystemState {
    pub fn new(build: BuildInfo, tracer_provider: SharedTracerProvider) -> Self {
        Self {
            build,
            tracer_provider,
        }
    }
}

impl Default for SystemState {
    fn default() -> Self {
        Self::new(BuildInfo::default(), noop_tracer_provider())
    }
}
