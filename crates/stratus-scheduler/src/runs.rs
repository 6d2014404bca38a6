//! Durable, capped history of ingest runs
//!
//! The store is a mutex-guarded FIFO persisted as a JSON array via
//! write-to-temp + atomic rename. The file is loaded lazily; malformed or
//! partially written files are treated as an empty history, and malformed
//! entries are skipped individually.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Lifecycle state of an ingest run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestRunStatus {
    Running,
    Success,
    Failed,
}

/// One ingest run record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestRun {
    /// 128-bit hex id.
    pub run_id: String,
    pub status: IngestRunStatus,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub attempts: u32,
}

/// A partial update applied to a run by id.
#[derive(Debug, Clone, Default)]
pub struct RunUpdate {
    pub status: Option<IngestRunStatus>,
    pub end_time: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub attempts: Option<u32>,
}

#[derive(Default)]
struct StoreInner {
    runs: Vec<IngestRun>,
    loaded: bool,
}

/// Thread-safe, durable, capped FIFO of [`IngestRun`] records.
pub struct IngestRunStore {
    storage_path: Option<PathBuf>,
    max_entries: usize,
    inner: Mutex<StoreInner>,
}

fn utc_now_seconds() -> DateTime<Utc> {
    let now = Utc::now();
    Utc.timestamp_opt(now.timestamp(), 0).single().expect("valid now")
}

impl IngestRunStore {
    /// Create a store persisting at `storage_path`, keeping at most
    /// `max_entries` records (oldest evicted first).
    pub fn new(storage_path: Option<PathBuf>, max_entries: usize) -> Self {
        Self {
            storage_path,
            max_entries: max_entries.max(1),
            inner: Mutex::new(StoreInner::default()),
        }
    }

    /// A store without persistence.
    pub fn in_memory(max_entries: usize) -> Self {
        Self::new(None, max_entries)
    }

    pub fn storage_path(&self) -> Option<&Path> {
        self.storage_path.as_deref()
    }

    fn ensure_loaded(&self, inner: &mut StoreInner) {
        if inner.loaded {
            return;
        }
        inner.loaded = true;
        let Some(path) = &self.storage_path else {
            return;
        };
        let Ok(raw) = std::fs::read(path) else {
            return;
        };
        let Ok(items) = serde_json::from_slice::<Vec<serde_json::Value>>(&raw) else {
            warn!(path = %path.display(), "run history unreadable, starting empty");
            return;
        };
        let mut runs: Vec<IngestRun> = Vec::with_capacity(items.len());
        for item in items {
            match serde_json::from_value::<IngestRun>(item) {
                Ok(run) => runs.push(run),
                Err(_) => continue,
            }
        }
        let excess = runs.len().saturating_sub(self.max_entries);
        inner.runs = runs.split_off(excess);
    }

    fn persist(&self, inner: &StoreInner) -> Result<()> {
        let Some(path) = &self.storage_path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let body = serde_json::to_vec(&inner.runs)?;
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, body)?;
        std::fs::rename(&tmp_path, path)
            .map_err(|e| Error::Storage(format!("failed to persist run history: {e}")))?;
        Ok(())
    }

    /// Append a new `running` record and persist.
    pub fn create_run(&self) -> Result<IngestRun> {
        let run = IngestRun {
            run_id: Uuid::new_v4().simple().to_string(),
            status: IngestRunStatus::Running,
            start_time: utc_now_seconds(),
            end_time: None,
            error: None,
            attempts: 1,
        };
        let mut inner = self.inner.lock().expect("store poisoned");
        self.ensure_loaded(&mut inner);
        inner.runs.push(run.clone());
        let excess = inner.runs.len().saturating_sub(self.max_entries);
        if excess > 0 {
            inner.runs.drain(..excess);
        }
        self.persist(&inner)?;
        Ok(run)
    }

    /// Apply a partial update to a run by id and persist.
    pub fn update_run(&self, run_id: &str, update: RunUpdate) -> Result<IngestRun> {
        let mut inner = self.inner.lock().expect("store poisoned");
        self.ensure_loaded(&mut inner);
        let run = inner
            .runs
            .iter_mut()
            .find(|run| run.run_id == run_id)
            .ok_or_else(|| Error::not_found(format!("run_id not found: {run_id}")))?;

        if let Some(status) = update.status {
            run.status = status;
        }
        if let Some(end_time) = update.end_time {
            run.end_time = Some(end_time);
        }
        if let Some(error) = update.error {
            run.error = Some(error);
        }
        if let Some(attempts) = update.attempts {
            run.attempts = attempts;
        }
        let updated = run.clone();
        self.persist(&inner)?;
        Ok(updated)
    }

    /// Up to `limit` runs, newest first.
    pub fn list_runs(&self, limit: usize) -> Vec<IngestRun> {
        if limit == 0 {
            return Vec::new();
        }
        let mut inner = self.inner.lock().expect("store poisoned");
        self.ensure_loaded(&mut inner);
        inner.runs.iter().rev().take(limit).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_list_newest_first() {
        let store = IngestRunStore::in_memory(10);
        let first = store.create_run().unwrap();
        let second = store.create_run().unwrap();

        let runs = store.list_runs(10);
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].run_id, second.run_id);
        assert_eq!(runs[1].run_id, first.run_id);
        assert_eq!(runs[0].status, IngestRunStatus::Running);
        assert_eq!(runs[0].run_id.len(), 32);

        assert_eq!(store.list_runs(1).len(), 1);
        assert!(store.list_runs(0).is_empty());
    }

    #[test]
    fn test_update_run() {
        let store = IngestRunStore::in_memory(10);
        let run = store.create_run().unwrap();
        let updated = store
            .update_run(
                &run.run_id,
                RunUpdate {
                    status: Some(IngestRunStatus::Failed),
                    end_time: Some(Utc::now()),
                    error: Some("decode failed".to_string()),
                    attempts: Some(3),
                },
            )
            .unwrap();
        assert_eq!(updated.status, IngestRunStatus::Failed);
        assert_eq!(updated.attempts, 3);
        assert_eq!(updated.error.as_deref(), Some("decode failed"));

        let err = store.update_run("missing", RunUpdate::default()).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_cap_evicts_oldest() {
        let store = IngestRunStore::in_memory(2);
        let first = store.create_run().unwrap();
        store.create_run().unwrap();
        store.create_run().unwrap();

        let runs = store.list_runs(10);
        assert_eq!(runs.len(), 2);
        assert!(runs.iter().all(|run| run.run_id != first.run_id));
    }

    #[test]
    fn test_persistence_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs.json");

        let store = IngestRunStore::new(Some(path.clone()), 10);
        let run = store.create_run().unwrap();
        store
            .update_run(
                &run.run_id,
                RunUpdate {
                    status: Some(IngestRunStatus::Success),
                    end_time: Some(utc_now_seconds()),
                    ..RunUpdate::default()
                },
            )
            .unwrap();

        let reopened = IngestRunStore::new(Some(path), 10);
        let runs = reopened.list_runs(10);
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].run_id, run.run_id);
        assert_eq!(runs[0].status, IngestRunStatus::Success);
    }

    #[test]
    fn test_malformed_history_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs.json");
        std::fs::write(&path, b"{not json").unwrap();

        let store = IngestRunStore::new(Some(path.clone()), 10);
        assert!(store.list_runs(10).is_empty());

        // Valid array with one malformed entry keeps the good entries.
        std::fs::write(
            &path,
            br#"[{"nope": true}, {"run_id": "abc", "status": "success", "start_time": "2026-01-01T00:00:00Z", "attempts": 1}]"#,
        )
        .unwrap();
        let store = IngestRunStore::new(Some(path), 10);
        let runs = store.list_runs(10);
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].run_id, "abc");
    }
}
