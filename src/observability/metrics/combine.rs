//! Fan-out over several metric backends.

use std::sync::Arc;

use super::{
    Metric, MetricsHandler, StatCounter, StatCounterVec, StatGauge, StatGaugeVec, StatTimer,
    StatTimerVec,
};
use crate::error::{LabelMismatch, MetricsError};

/// Forwards every call to each child backend. With no children it behaves
/// like [`super::NoopMetric`].
#[derive(Clone, Default)]
pub struct CombineMetric {
    children: Vec<Arc<dyn Metric>>,
}

impl CombineMetric {
    pub fn new(children: Vec<Arc<dyn Metric>>) -> Self {
        Self { children }
    }

    pub fn with(mut self, metric: Arc<dyn Metric>) -> Self {
        self.children.push(metric);
        self
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

struct Fanout<T: ?Sized>(Vec<Arc<T>>);

impl StatCounter for Fanout<dyn StatCounter> {
    fn incr(&self, count: u64) {
        self.0.iter().for_each(|c| c.incr(count));
    }
}

impl StatGauge for Fanout<dyn StatGauge> {
    fn set(&self, value: i64) {
        self.0.iter().for_each(|g| g.set(value));
    }

    fn incr(&self, count: i64) {
        self.0.iter().for_each(|g| g.incr(count));
    }

    fn decr(&self, count: i64) {
        self.0.iter().for_each(|g| g.decr(count));
    }
}

impl StatTimer for Fanout<dyn StatTimer> {
    fn timing(&self, nanos: u64) {
        self.0.iter().for_each(|t| t.timing(nanos));
    }
}

impl StatCounterVec for Fanout<dyn StatCounterVec> {
    fn with_values(&self, label_values: &[&str]) -> Arc<dyn StatCounter> {
        Arc::new(Fanout(
            self.0.iter().map(|v| v.with_values(label_values)).collect(),
        ))
    }
}

impl StatGaugeVec for Fanout<dyn StatGaugeVec> {
    fn with_values(&self, label_values: &[&str]) -> Arc<dyn StatGauge> {
        Arc::new(Fanout(
            self.0.iter().map(|v| v.with_values(label_values)).collect(),
        ))
    }
}

impl StatTimerVec for Fanout<dyn StatTimerVec> {
    fn with_values(&self, label_values: &[&str]) -> Arc<dyn StatTimer> {
        Arc::new(Fanout(
            self.0.iter().map(|v| v.with_values(label_values)).collect(),
        ))
    }
}

impl Metric for CombineMetric {
    fn try_counter_vec(
        &self,
        name: &str,
        label_names: &[&str],
    ) -> Result<Arc<dyn StatCounterVec>, LabelMismatch> {
        let vecs = self
            .children
            .iter()
            .map(|m| m.try_counter_vec(name, label_names))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Arc::new(Fanout(vecs)))
    }

    fn try_gauge_vec(
        &self,
        name: &str,
        label_names: &[&str],
    ) -> Result<Arc<dyn StatGaugeVec>, LabelMismatch> {
        let vecs = self
            .children
            .iter()
            .map(|m| m.try_gauge_vec(name, label_names))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Arc::new(Fanout(vecs)))
    }

    fn try_timer_vec(
        &self,
        name: &str,
        label_names: &[&str],
    ) -> Result<Arc<dyn StatTimerVec>, LabelMismatch> {
        let vecs = self
            .children
            .iter()
            .map(|m| m.try_timer_vec(name, label_names))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Arc::new(Fanout(vecs)))
    }

    /// The first child's handler.
    fn handler(&self) -> Option<MetricsHandler> {
        self.children.iter().find_map(|m| m.handler())
    }

    /// Closes every child, even after a failure.
    fn close(&self) -> Result<(), MetricsError> {
        let errors: Vec<MetricsError> = self
            .children
            .iter()
            .filter_map(|m| m.close().err())
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(MetricsError::Combined(errors))
        }
    }
}
