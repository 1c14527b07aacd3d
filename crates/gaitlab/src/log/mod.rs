//! Unified metric logging.
//!
//! Provides:
//! - `MetricLogger` trait for composable backends
//! - `ConsoleLogger` for lightweight logging through `tracing`
//! - `JsonlLogger`, the experiment-tracking stream (one JSON object per line)
//! - `TensorBoardLogger` for TensorBoard event files
//! - `CompositeLogger` for multi-backend logging

mod console;
mod jsonl;
mod logger;
mod tensorboard;

pub use console::ConsoleLogger;
pub use jsonl::JsonlLogger;
pub use logger::{CompositeLogger, MetricLogger, Metrics};
pub use tensorboard::TensorBoardLogger;
