//! Append-only JSON-lines audit log

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use tracing::info;
use uuid::Uuid;

use crate::error::Result;

/// One audit record; serialized as a single JSON line.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEvent {
    pub event: String,
    pub run_id: String,
    /// RFC 3339 UTC with a `Z` suffix.
    pub timestamp: String,
    pub payload: Map<String, Value>,
}

impl AuditEvent {
    fn to_json(&self) -> Value {
        let mut out = Map::new();
        out.insert("event".to_string(), json!(self.event));
        out.insert("run_id".to_string(), json!(self.run_id));
        out.insert("timestamp".to_string(), json!(self.timestamp));
        for (key, value) in &self.payload {
            out.insert(key.clone(), value.clone());
        }
        Value::Object(out)
    }
}

/// Appends audit events to a JSON-lines file under a mutex.
pub struct AuditLogger {
    path: PathBuf,
    lock: Mutex<()>,
}

impl AuditLogger {
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        Self {
            path: log_path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Fresh 128-bit hex run id for grouping a cleanup pass.
    pub fn new_run_id(&self) -> String {
        Uuid::new_v4().simple().to_string()
    }

    /// Append one event. The write happens under the logger's mutex so
    /// concurrent cleanup tasks interleave whole lines.
    pub fn record(
        &self,
        event: &str,
        run_id: &str,
        payload: Map<String, Value>,
    ) -> Result<AuditEvent> {
        self.record_at(event, run_id, payload, Utc::now())
    }

    /// Append one event with an explicit timestamp.
    pub fn record_at(
        &self,
        event: &str,
        run_id: &str,
        payload: Map<String, Value>,
        now: DateTime<Utc>,
    ) -> Result<AuditEvent> {
        let audit_event = AuditEvent {
            event: event.to_string(),
            run_id: run_id.to_string(),
            timestamp: now.to_rfc3339_opts(SecondsFormat::Micros, true),
            payload,
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut line = serde_json::to_vec(&audit_event.to_json())?;
        line.push(b'\n');

        {
            let _guard = self.lock.lock().expect("audit lock poisoned");
            use std::io::Write;
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
            file.write_all(&line)?;
        }

        info!(event, run_id, "audit event recorded");
        Ok(audit_event)
    }
}
