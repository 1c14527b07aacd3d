//! Metric logger traits and composites.

use std::collections::BTreeMap;

/// Named scalar metrics, ordered by name.
pub type Metrics = BTreeMap<String, f64>;

/// Trait for logging metrics to various backends.
pub trait MetricLogger: Send + Sync {
    /// Log a scalar value (e.g. reward, loss).
    fn log_scalar(&self, name: &str, value: f64, step: u64);

    /// Log a set of metrics for one step.
    fn log_metrics(&self, metrics: &Metrics, step: u64);

    /// Close the logger and flush any pending writes.
    fn close(&self) {}
}

/// A composite logger that dispatches to multiple backends.
#[derive(Default)]
pub struct CompositeLogger {
    loggers: Vec<Box<dyn MetricLogger>>,
}

impl CompositeLogger {
    pub fn new(loggers: Vec<Box<dyn MetricLogger>>) -> Self {
        Self { loggers }
    }

    pub fn add(&mut self, logger: Box<dyn MetricLogger>) {
        self.loggers.push(logger);
    }

    pub fn len(&self) -> usize {
        self.loggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loggers.is_empty()
    }
}

impl MetricLogger for CompositeLogger {
    fn log_scalar(&self, name: &str, value: f64, step: u64) {
        for logger in &self.loggers {
            logger.log_scalar(name, value, step);
        }
    }

    fn log_metrics(&self, metrics: &Metrics, step: u64) {
        for logger in &self.loggers {
            logger.log_metrics(metrics, step);
        }
    }

    fn close(&self) {
        for logger in &self.loggers {
            logger.close();
        }
    }
}
