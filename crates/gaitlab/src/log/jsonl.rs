//! JSON-lines experiment tracking backend.

use super::{MetricLogger, Metrics};
use crate::Result;
use serde_json::{json, Map, Value};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Logger that appends one JSON object per call to `tracking_<id>.jsonl`.
///
/// The tracking id names the stream: reopening with the same id (a resumed
/// run) appends to the existing file instead of starting a new one.
pub struct JsonlLogger {
    tracking_id: String,
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl JsonlLogger {
    /// Open (or create) the stream for `tracking_id` in `dir`, generating a new
    /// id when none is given.
    pub fn open(dir: impl AsRef<Path>, tracking_id: Option<String>) -> Result<Self> {
        let tracking_id = tracking_id.unwrap_or_else(|| format!("{:08x}", rand::random::<u32>()));
        let path = dir.as_ref().join(format!("tracking_{}.jsonl", tracking_id));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        tracing::info!(tracking_id = %tracking_id, path = %path.display(), "Tracking run");

        Ok(Self {
            tracking_id,
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn tracking_id(&self) -> &str {
        &self.tracking_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_line(&self, record: Value) {
        if let Ok(mut writer) = self.writer.lock() {
            let written = serde_json::to_writer(&mut *writer, &record)
                .map_err(std::io::Error::from)
                .and_then(|_| writer.write_all(b"\n"))
                .and_then(|_| writer.flush());
            if let Err(e) = written {
                tracing::warn!(path = %self.path.display(), "Failed to write metrics: {}", e);
            }
        }
    }
}

impl MetricLogger for JsonlLogger {
    fn log_scalar(&self, name: &str, value: f64, step: u64) {
        self.write_line(json!({ "step": step, name: value }));
    }

    fn log_metrics(&self, metrics: &Metrics, step: u64) {
        let mut record = Map::new();
        record.insert("step".into(), json!(step));
        for (name, value) in metrics {
            record.insert(name.clone(), json!(value));
        }
        self.write_line(Value::Object(record));
    }

    fn close(&self) {
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writer.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_writes_one_object_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let logger = JsonlLogger::open(dir.path(), Some("abc".into())).unwrap();

        let mut metrics = Metrics::new();
        metrics.insert("update/value_loss".into(), 0.5);
        logger.log_metrics(&metrics, 7);
        logger.log_scalar("episode/reward_progress", 1.25, 7);
        logger.close();

        let text = fs::read_to_string(dir.path().join("tracking_abc.jsonl")).unwrap();
        let lines: Vec<Value> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["step"], 7);
        assert_eq!(lines[0]["update/value_loss"], 0.5);
        assert_eq!(lines[1]["episode/reward_progress"], 1.25);
    }

    #[test]
    fn test_same_id_appends() {
        let dir = tempfile::tempdir().unwrap();
        let first = JsonlLogger::open(dir.path(), None).unwrap();
        let id = first.tracking_id().to_string();
        first.log_scalar("update/step", 1.0, 1);
        drop(first);

        let resumed = JsonlLogger::open(dir.path(), Some(id.clone())).unwrap();
        resumed.log_scalar("update/step", 2.0, 2);
        resumed.close();

        let text = fs::read_to_string(resumed.path()).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(resumed.path().ends_with(format!("tracking_{}.jsonl", id)));
    }
}
