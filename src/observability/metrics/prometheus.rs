//! Prometheus backend built on a `metrics` recorder.
//!
//! Vectors are cached per name behind a reader/writer lock. Lookup takes the
//! read lock first; on a miss it takes the write lock and checks again before
//! describing the new metric, so concurrent first use registers it once.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use ::metrics::{
    Counter, Gauge, Histogram, Key, KeyName, Label, Level, Metadata, Recorder, SharedString,
    Unit,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusRecorder};
use metrics_process::Collector;

use super::{
    Gatherer, Metric, MetricsHandler, StatCounter, StatCounterVec, StatGauge, StatGaugeVec, StatTimer,
    StatTimerVec, assert_arity, canonical_labels, check_labels,
};
use crate::error::{ConfigError, LabelMismatch, MetricKind, MetricsError};

static METADATA: Metadata<'static> =
    Metadata::new(module_path!(), Level::INFO, Some(module_path!()));

/// Options for [`PrometheusMetric::new`].
#[derive(Debug, Clone)]
pub struct PrometheusConfig {
    /// Prepended to every metric name.
    pub prefix: String,
    /// Labels attached to every series.
    pub global_labels: BTreeMap<String, String>,
    /// Quantiles reported for timers.
    pub quantiles: Vec<f64>,
    /// Expose `process_*` series (CPU, memory, file descriptors), refreshed
    /// on every scrape.
    pub process_metrics: bool,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            global_labels: BTreeMap::new(),
            quantiles: vec![0.5, 0.9, 0.99],
            process_metrics: true,
        }
    }
}

/// A registered metric name and its label schema.
struct Family {
    key_name: KeyName,
    label_names: Vec<String>,
}

impl Family {
    /// Key for one label combination. `names` is the caller's label order.
    fn key(&self, names: &[String], values: &[&str]) -> Key {
        assert_arity(names, values);
        let mut labels: Vec<Label> = names
            .iter()
            .zip(values)
            .map(|(name, value)| Label::new(name.clone(), value.to_string()))
            .collect();
        labels.sort_by(|a, b| a.key().cmp(b.key()));
        Key::from_parts(self.key_name.clone(), labels)
    }
}

type FamilyMap = RwLock<HashMap<String, Arc<Family>>>;

pub struct PrometheusMetric {
    prefix: String,
    recorder: Arc<dyn Recorder + Send + Sync>,
    handler: Option<MetricsHandler>,
    counters: FamilyMap,
    gauges: FamilyMap,
    timers: FamilyMap,
}

impl PrometheusMetric {
    /// Builds a private Prometheus recorder; it is not installed globally.
    pub fn new(config: PrometheusConfig) -> Result<Self, ConfigError> {
        let mut builder = PrometheusBuilder::new()
            .set_quantiles(&config.quantiles)
            .map_err(|e| ConfigError::InvalidOption {
                option: "quantiles",
                reason: e.to_string(),
            })?;
        for (key, value) in &config.global_labels {
            builder = builder.add_global_label(key, value);
        }

        let recorder = Arc::new(builder.build_recorder());
        let gatherer: Arc<dyn Gatherer> = if config.process_metrics {
            Arc::new(ProcessGatherer::new(recorder.clone()))
        } else {
            Arc::new(recorder.handle())
        };

        tracing::info!(
            prefix = %config.prefix,
            global_labels = config.global_labels.len(),
            process_metrics = config.process_metrics,
            "Prometheus metrics registry initialized"
        );

        Ok(Self::from_parts(
            recorder,
            Some(MetricsHandler::new(gatherer)),
            config.prefix,
        ))
    }

    /// Assemble a registry from an arbitrary recorder. Without a handler the
    /// registry aggregates but cannot be exposed.
    pub fn from_parts(
        recorder: Arc<dyn Recorder + Send + Sync>,
        handler: Option<MetricsHandler>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            recorder,
            handler,
            counters: RwLock::new(HashMap::new()),
            gauges: RwLock::new(HashMap::new()),
            timers: RwLock::new(HashMap::new()),
        }
    }

    fn family(
        &self,
        kind: MetricKind,
        name: &str,
        label_names: &[&str],
    ) -> Result<Arc<Family>, LabelMismatch> {
        let map = match kind {
            MetricKind::Counter => &self.counters,
            MetricKind::Gauge => &self.gauges,
            MetricKind::Timer => &self.timers,
        };

        {
            let families = map.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(family) = families.get(name) {
                check_labels(kind, name, &family.label_names, label_names)?;
                return Ok(family.clone());
            }
        }

        let mut families = map.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(family) = families.get(name) {
            check_labels(kind, name, &family.label_names, label_names)?;
            return Ok(family.clone());
        }

        let key_name = KeyName::from(format!("{}{}", self.prefix, name));
        let description = SharedString::from(format!("{name} {kind} metric"));
        match kind {
            MetricKind::Counter => self.recorder.describe_counter(key_name.clone(), None, description),
            MetricKind::Gauge => self.recorder.describe_gauge(key_name.clone(), None, description),
            MetricKind::Timer => self.recorder.describe_histogram(
                key_name.clone(),
                Some(Unit::Nanoseconds),
                description,
            ),
        }

        let family = Arc::new(Family {
            key_name,
            label_names: canonical_labels(label_names),
        });
        families.insert(name.to_string(), family.clone());

        tracing::debug!(metric = %name, kind = %kind, labels = ?label_names, "Registered metric vector");
        Ok(family)
    }
}

/// Refreshes the process series in the private recorder, then renders it.
struct ProcessGatherer {
    recorder: Arc<PrometheusRecorder>,
    collector: Collector,
}

impl ProcessGatherer {
    fn new(recorder: Arc<PrometheusRecorder>) -> Self {
        let collector = Collector::default();
        ::metrics::with_local_recorder(recorder.as_ref(), || collector.describe());
        Self {
            recorder,
            collector,
        }
    }
}

impl Gatherer for ProcessGatherer {
    fn gather(&self) -> String {
        ::metrics::with_local_recorder(self.recorder.as_ref(), || self.collector.collect());
        self.recorder.handle().render()
    }
}

fn owned(label_names: &[&str]) -> Vec<String> {
    label_names.iter().map(|n| n.to_string()).collect()
}

impl Metric for PrometheusMetric {
    fn try_counter_vec(
        &self,
        name: &str,
        label_names: &[&str],
    ) -> Result<Arc<dyn StatCounterVec>, LabelMismatch> {
        let family = self.family(MetricKind::Counter, name, label_names)?;
        Ok(Arc::new(PromCounterVec {
            family,
            names: owned(label_names),
            recorder: self.recorder.clone(),
        }))
    }

    fn try_gauge_vec(
        &self,
        name: &str,
        label_names: &[&str],
    ) -> Result<Arc<dyn StatGaugeVec>, LabelMismatch> {
        let family = self.family(MetricKind::Gauge, name, label_names)?;
        Ok(Arc::new(PromGaugeVec {
            family,
            names: owned(label_names),
            recorder: self.recorder.clone(),
        }))
    }

    fn try_timer_vec(
        &self,
        name: &str,
        label_names: &[&str],
    ) -> Result<Arc<dyn StatTimerVec>, LabelMismatch> {
        let family = self.family(MetricKind::Timer, name, label_names)?;
        Ok(Arc::new(PromTimerVec {
            family,
            names: owned(label_names),
            recorder: self.recorder.clone(),
        }))
    }

    fn handler(&self) -> Option<MetricsHandler> {
        self.handler.clone()
    }

    fn close(&self) -> Result<(), MetricsError> {
        Ok(())
    }
}

struct PromCounterVec {
    family: Arc<Family>,
    names: Vec<String>,
    recorder: Arc<dyn Recorder + Send + Sync>,
}

impl StatCounterVec for PromCounterVec {
    fn with_values(&self, label_values: &[&str]) -> Arc<dyn StatCounter> {
        let key = self.family.key(&self.names, label_values);
        Arc::new(PromCounter(self.recorder.register_counter(&key, &METADATA)))
    }
}

struct PromGaugeVec {
    family: Arc<Family>,
    names: Vec<String>,
    recorder: Arc<dyn Recorder + Send + Sync>,
}

impl StatGaugeVec for PromGaugeVec {
    fn with_values(&self, label_values: &[&str]) -> Arc<dyn StatGauge> {
        let key = self.family.key(&self.names, label_values);
        Arc::new(PromGauge(self.recorder.register_gauge(&key, &METADATA)))
    }
}

struct PromTimerVec {
    family: Arc<Family>,
    names: Vec<String>,
    recorder: Arc<dyn Recorder + Send + Sync>,
}

impl StatTimerVec for PromTimerVec {
    fn with_values(&self, label_values: &[&str]) -> Arc<dyn StatTimer> {
        let key = self.family.key(&self.names, label_values);
        Arc::new(PromTimer(self.recorder.register_histogram(&key, &METADATA)))
    }
}

struct PromCounter(Counter);

impl StatCounter for PromCounter {
    fn incr(&self, count: u64) {
        self.0.increment(count);
    }
}

struct PromGauge(Gauge);

impl StatGauge for PromGauge {
    fn set(&self, value: i64) {
        self.0.set(value as f64);
    }

    fn incr(&self, count: i64) {
        self.0.increment(count as f64);
    }

    fn decr(&self, count: i64) {
        self.0.decrement(count.unsigned_abs() as f64);
    }
}

struct PromTimer(Histogram);

impl StatTimer for PromTimer {
    fn timing(&self, nanos: u64) {
        self.0.record(nanos as f64);
    }
}
