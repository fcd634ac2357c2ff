use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

use trigger_types::ExecutionRecord;

/// Where [`ExecutionRecord`]s go once a rule has been evaluated.
///
/// spec.md §3/§9 leaves execution-record persistence unspecified
/// ("an implementer may choose any store or drop persistence") — this
/// trait is that choice made concrete, with [`NullExecutionSink`] as
/// the no-op default and [`JsonlExecutionSink`] for operator
/// visibility. See DESIGN.md.
pub trait ExecutionSink: Send + Sync {
    fn record(&self, record: &ExecutionRecord);
}

/// Drops every record. The default — matches spec.md's framing of
/// execution history as optional, not a correctness dependency.
pub struct NullExecutionSink;

impl ExecutionSink for NullExecutionSink {
    fn record(&self, _record: &ExecutionRecord) {}
}

/// Appends records as JSON Lines to a file — same `BufWriter` +
/// `Mutex` + one-line-per-record shape as the teacher's
/// `FileAlertSink` (`wf-core::alert::sink`), ported from alerts to
/// execution records.
pub struct JsonlExecutionSink {
    writer: Mutex<BufWriter<File>>,
}

impl JsonlExecutionSink {
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path.as_ref())?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }
}

impl ExecutionSink for JsonlExecutionSink {
    fn record(&self, record: &ExecutionRecord) {
        let Ok(json) = serde_json::to_string(record) else {
            return;
        };
        let mut w = self.writer.lock().expect("execution sink lock poisoned");
        if w.write_all(json.as_bytes()).is_err() {
            return;
        }
        let _ = w.write_all(b"\n");
        let _ = w.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::io::Read;

    fn sample_record() -> ExecutionRecord {
        ExecutionRecord {
            rule_id: "r1".to_string(),
            context_key: "k".to_string(),
            event_id: "e1".to_string(),
            fired: true,
            confidence: Some(0.9),
            reasoning: Some("matched".to_string()),
            statuses: vec![],
            evaluated_at: Utc::now(),
        }
    }

    #[test]
    fn null_sink_does_nothing() {
        let sink = NullExecutionSink;
        sink.record(&sample_record());
    }

    #[test]
    fn jsonl_sink_appends_one_line_per_record() {
        let dir = std::env::temp_dir().join("trigger_core_sink_test");
        let _ = std::fs::create_dir_all(&dir);
        let path = dir.join("executions.jsonl");
        let _ = std::fs::remove_file(&path);

        {
            let sink = JsonlExecutionSink::open(&path).unwrap();
            sink.record(&sample_record());
            let mut second = sample_record();
            second.rule_id = "r2".to_string();
            sink.record(&second);
        }

        let mut contents = String::new();
        File::open(&path).unwrap().read_to_string(&mut contents).unwrap();
        let lines: Vec<&str> = contents.trim().split('\n').collect();
        assert_eq!(lines.len(), 2);

        let parsed: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["rule_id"], "r1");
        let parsed2: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(parsed2["rule_id"], "r2");

        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_dir(&dir);
    }
}
