use std::sync::Arc;

use super::{
    Metric, MetricsHandler, StatCounter, StatCounterVec, StatGauge, StatGaugeVec, StatTimer,
    StatTimerVec,
};
use crate::error::{LabelMismatch, MetricsError};

/// Backend that accepts every call and records nothing. It serves no
/// exposition handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetric;

impl NoopMetric {
    pub fn shared() -> Arc<dyn Metric> {
        Arc::new(NoopMetric)
    }
}

struct NoopStat;

impl StatCounter for NoopStat {
    fn incr(&self, _: u64) {}
}

impl StatGauge for NoopStat {
    fn set(&self, _: i64) {}
    fn incr(&self, _: i64) {}
    fn decr(&self, _: i64) {}
}

impl StatTimer for NoopStat {
    fn timing(&self, _: u64) {}
}

impl StatCounterVec for NoopStat {
    fn with_values(&self, _: &[&str]) -> Arc<dyn StatCounter> {
        Arc::new(NoopStat)
    }
}

impl StatGaugeVec for NoopStat {
    fn with_values(&self, _: &[&str]) -> Arc<dyn StatGauge> {
        Arc::new(NoopStat)
    }
}

impl StatTimerVec for NoopStat {
    fn with_values(&self, _: &[&str]) -> Arc<dyn StatTimer> {
        Arc::new(NoopStat)
    }
}

impl Metric for NoopMetric {
    fn try_counter_vec(&self, _: &str, _: &[&str]) -> Result<Arc<dyn StatCounterVec>, LabelMismatch> {
        Ok(Arc::new(NoopStat))
    }

    fn try_gauge_vec(&self, _: &str, _: &[&str]) -> Result<Arc<dyn StatGaugeVec>, LabelMismatch> {
        Ok(Arc::new(NoopStat))
    }

    fn try_timer_vec(&self, _: &str, _: &[&str]) -> Result<Arc<dyn StatTimerVec>, LabelMismatch> {
        Ok(Arc::new(NoopStat))
    }

    fn handler(&self) -> Option<MetricsHandler> {
        None
    }

    fn close(&self) -> Result<(), MetricsError> {
        Ok(())
    }
}
