//! Metric instrument registry
//!
//! A [`Metric`] maps a metric name to exactly one label-name set and hands out
//! label vectors. Binding label values on a vector (`with_values`) yields the
//! concrete instrument for one label combination.
//!
//! Requesting an already registered name with a different label-name set is a
//! programmer error. The `try_*` methods surface it as [`LabelMismatch`]; the
//! plain methods panic with it.
//!
//! Backends:
//! - [`PrometheusMetric`]: aggregates through a `metrics` recorder and exposes
//!   the Prometheus text format
//! - [`NoopMetric`]: discards everything
//! - [`CombineMetric`]: forwards to any number of backends

mod combine;
mod noop;
mod prometheus;

pub use combine::CombineMetric;
pub use noop::NoopMetric;
pub use prometheus::{PrometheusConfig, PrometheusMetric};

use std::sync::Arc;
use std::time::Duration;

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use metrics_exporter_prometheus::PrometheusHandle;

use crate::error::{LabelMismatch, MetricKind, MetricsError};

/// Content type of the Prometheus text exposition format.
pub const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Monotonic counter.
pub trait StatCounter: Send + Sync {
    fn incr(&self, count: u64);
}

/// Settable gauge.
pub trait StatGauge: Send + Sync {
    fn set(&self, value: i64);
    fn incr(&self, count: i64);
    /// Decrements by the magnitude of `count`.
    fn decr(&self, count: i64);
}

/// Latency observations, in nanoseconds.
pub trait StatTimer: Send + Sync {
    fn timing(&self, nanos: u64);

    fn record(&self, elapsed: Duration) {
        self.timing(u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX));
    }
}

pub trait StatCounterVec: Send + Sync {
    /// Binds values positionally to the label names the vector was requested
    /// with. Panics if the number of values differs from the number of names.
    fn with_values(&self, label_values: &[&str]) -> Arc<dyn StatCounter>;
}

pub trait StatGaugeVec: Send + Sync {
    fn with_values(&self, label_values: &[&str]) -> Arc<dyn StatGauge>;
}

pub trait StatTimerVec: Send + Sync {
    fn with_values(&self, label_values: &[&str]) -> Arc<dyn StatTimer>;
}

/// Metrics aggregation backend.
pub trait Metric: Send + Sync {
    fn try_counter_vec(
        &self,
        name: &str,
        label_names: &[&str],
    ) -> Result<Arc<dyn StatCounterVec>, LabelMismatch>;

    fn try_gauge_vec(
        &self,
        name: &str,
        label_names: &[&str],
    ) -> Result<Arc<dyn StatGaugeVec>, LabelMismatch>;

    fn try_timer_vec(
        &self,
        name: &str,
        label_names: &[&str],
    ) -> Result<Arc<dyn StatTimerVec>, LabelMismatch>;

    /// Exposition handler, if this backend serves one.
    fn handler(&self) -> Option<MetricsHandler>;

    /// Stop aggregating and release resources.
    fn close(&self) -> Result<(), MetricsError>;

    /// Like [`Metric::try_counter_vec`] but panics on a label mismatch.
    fn counter_vec(&self, name: &str, label_names: &[&str]) -> Arc<dyn StatCounterVec> {
        self.try_counter_vec(name, label_names)
            .unwrap_or_else(|err| panic!("{err}"))
    }

    fn gauge_vec(&self, name: &str, label_names: &[&str]) -> Arc<dyn StatGaugeVec> {
        self.try_gauge_vec(name, label_names)
            .unwrap_or_else(|err| panic!("{err}"))
    }

    fn timer_vec(&self, name: &str, label_names: &[&str]) -> Arc<dyn StatTimerVec> {
        self.try_timer_vec(name, label_names)
            .unwrap_or_else(|err| panic!("{err}"))
    }
}

/// Source of the current exposition text.
pub trait Gatherer: Send + Sync {
    fn gather(&self) -> String;
}

impl Gatherer for PrometheusHandle {
    fn gather(&self) -> String {
        self.render()
    }
}

/// Serves the exposition text of a backend.
#[derive(Clone)]
pub struct MetricsHandler {
    gatherer: Arc<dyn Gatherer>,
}

impl MetricsHandler {
    pub fn new(gatherer: Arc<dyn Gatherer>) -> Self {
        Self { gatherer }
    }

    pub fn render(&self) -> String {
        self.gatherer.gather()
    }

    pub fn respond(&self) -> Response {
        (
            StatusCode::OK,
            [(header::CONTENT_TYPE, EXPOSITION_CONTENT_TYPE)],
            self.render(),
        )
            .into_response()
    }
}

impl std::fmt::Debug for MetricsHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsHandler").finish_non_exhaustive()
    }
}

/// Label names in canonical (sorted) order.
pub(crate) fn canonical_labels(label_names: &[&str]) -> Vec<String> {
    let mut names: Vec<String> = label_names.iter().map(|n| n.to_string()).collect();
    names.sort();
    names
}

/// Fails unless `requested` is the same set as `registered` (order-insensitive).
pub(crate) fn check_labels(
    kind: MetricKind,
    name: &str,
    registered: &[String],
    requested: &[&str],
) -> Result<(), LabelMismatch> {
    let requested = canonical_labels(requested);
    if requested == registered {
        Ok(())
    } else {
        Err(LabelMismatch {
            kind,
            name: name.to_string(),
            registered: registered.to_vec(),
            requested,
        })
    }
}

pub(crate) fn assert_arity(label_names: &[String], label_values: &[&str]) {
    assert_eq!(
        label_names.len(),
        label_values.len(),
        "expected {} label values for {:?}, got {}",
        label_names.len(),
        label_names,
        label_values.len()
    );
}
