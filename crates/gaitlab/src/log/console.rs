//! Console logging backend.

use super::{MetricLogger, Metrics};

/// Logger that reports metrics through `tracing`.
#[derive(Default)]
pub struct ConsoleLogger;

impl ConsoleLogger {
    pub fn new() -> Self {
        Self
    }
}

impl MetricLogger for ConsoleLogger {
    fn log_scalar(&self, name: &str, value: f64, step: u64) {
        tracing::info!("Update {}: {} = {:.4}", step, name, value);
    }

    fn log_metrics(&self, metrics: &Metrics, step: u64) {
        // Group output to avoid spamming lines
        let body = metrics
            .iter()
            .map(|(key, value)| format!("{}={:.4}", key, value))
            .collect::<Vec<_>>()
            .join(", ");

        tracing::info!("Update {}: {}", step, body);
    }
}
