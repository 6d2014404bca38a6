//! Tile jobs and the retrying cube tile worker

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use stratus_core::{retry::retry_with_backoff, ExponentialBackoff};
use stratus_cube::DataCube;

use crate::error::{Error, Result};
use crate::render::TileRenderer;

/// One unit of tile work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileJob {
    pub run_id: String,
    pub variable: String,
    /// Level key as it appears in tile paths (`sfc` or a numeric level).
    pub level: String,
    /// Valid time, RFC 3339.
    pub time: String,
}

/// Terminal job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Success,
    Failed,
}

/// Result of one job, failures included; the scheduler never unwinds.
#[derive(Debug, Clone, Serialize)]
pub struct TileJobResult {
    pub job: TileJob,
    pub status: JobStatus,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Processes tile jobs; implementations own their retry policy.
pub trait TileWorker: Send + Sync {
    /// Execute one job to completion, reporting failure as a result value.
    fn process(&self, job: &TileJob) -> TileJobResult;

    /// Retries attempted per job, for scheduler logging.
    fn max_retries(&self) -> u32;
}

/// The production worker: renders cube slices through a [`TileRenderer`],
/// retrying with exponential backoff before reporting failure.
pub struct CubeTileWorker {
    cube: Arc<DataCube>,
    renderer: Arc<TileRenderer>,
    layer: String,
    out_root: PathBuf,
    max_retries: u32,
    backoff: ExponentialBackoff,
}

impl CubeTileWorker {
    pub fn new(
        cube: Arc<DataCube>,
        renderer: Arc<TileRenderer>,
        layer: impl Into<String>,
        out_root: impl Into<PathBuf>,
        max_retries: u32,
        backoff: ExponentialBackoff,
    ) -> Self {
        Self {
            cube,
            renderer,
            layer: layer.into(),
            out_root: out_root.into(),
            max_retries,
            backoff,
        }
    }

    fn run_once(&self, job: &TileJob) -> Result<serde_json::Map<String, serde_json::Value>> {
        let time: DateTime<Utc> = job
            .time
            .parse()
            .map_err(|e| Error::invalid_argument(format!("bad job time {:?}: {e}", job.time)))?;
        let result = self.renderer.render_unit(
            &self.cube,
            &job.variable,
            &job.level,
            time,
            &self.out_root,
            &self.layer,
        )?;

        let mut metadata = serde_json::Map::new();
        metadata.insert("layer".to_string(), json!(result.layer));
        metadata.insert("time_key".to_string(), json!(result.time));
        metadata.insert("tiles_written".to_string(), json!(result.tiles_written));
        Ok(metadata)
    }
}

impl TileWorker for CubeTileWorker {
    fn process(&self, job: &TileJob) -> TileJobResult {
        let mut attempts = 0u32;
        let outcome = retry_with_backoff(self.max_retries, &self.backoff, |attempt| {
            attempts = attempt;
            self.run_once(job)
        });
        match outcome {
            Ok(metadata) => TileJobResult {
                job: job.clone(),
                status: JobStatus::Success,
                attempts,
                error: None,
                metadata,
            },
            Err(err) => TileJobResult {
                job: job.clone(),
                status: JobStatus::Failed,
                attempts,
                error: Some(err.to_string()),
                metadata: serde_json::Map::new(),
            },
        }
    }

    fn max_retries(&self) -> u32 {
        self.max_retries
    }
}
