use crate::orchestration::error::{io_error, json_error, WorkflowError};
use crate::orchestration::state::PhaseState;
use crate::orchestration::workflow_engine::WorkflowOutcome;
use crate::shared::fs_atomic::atomic_write_file;
use crate::shared::ids::request_fingerprint;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Succeeded => write!(f, "succeeded"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

/// What lands in `runs/<run_id>/state.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub run_id: String,
    pub request_fingerprint: String,
    pub status: RunStatus,
    #[serde(default)]
    pub failure: Option<String>,
    pub persisted_at: String,
    pub state: PhaseState,
}

impl RunRecord {
    pub fn from_outcome(outcome: &WorkflowOutcome) -> Self {
        let status = if outcome.succeeded() {
            RunStatus::Succeeded
        } else {
            RunStatus::Failed
        };
        Self {
            run_id: outcome.state.run_id.clone(),
            request_fingerprint: request_fingerprint(&outcome.state.feature_request),
            status,
            failure: outcome.failure.as_ref().map(ToString::to_string),
            persisted_at: chrono::Utc::now().to_rfc3339(),
            state: outcome.state.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunStore {
    state_root: PathBuf,
}

impl RunStore {
    pub fn new(state_root: impl Into<PathBuf>) -> Self {
        Self {
            state_root: state_root.into(),
        }
    }

    pub fn state_root(&self) -> &Path {
        &self.state_root
    }

    pub fn run_dir(&self, run_id: &str) -> PathBuf {
        self.state_root.join("runs").join(run_id)
    }

    pub fn state_path(&self, run_id: &str) -> PathBuf {
        self.run_dir(run_id).join("state.json")
    }

    pub fn persist(&self, record: &RunRecord) -> Result<PathBuf, WorkflowError> {
        let path = self.state_path(&record.run_id);
        let body = serde_json::to_string_pretty(record).map_err(|e| json_error(&path, e))?;
        atomic_write_file(&path, body.as_bytes()).map_err(|e| io_error(&path, e))?;
        Ok(path)
    }

    pub fn load(&self, run_id: &str) -> Result<RunRecord, WorkflowError> {
        let path = self.state_path(run_id);
        let raw = fs::read_to_string(&path).map_err(|e| io_error(&path, e))?;
        serde_json::from_str(&raw).map_err(|e| json_error(&path, e))
    }

    /// Most recently persisted run for the same feature request text.
    pub fn latest_for_request(
        &self,
        feature_request: &str,
    ) -> Result<Option<RunRecord>, WorkflowError> {
        let fingerprint = request_fingerprint(feature_request);
        let runs_root = self.state_root.join("runs");
        let entries = match fs::read_dir(&runs_root) {
            Ok(entries) => entries,
            Err(source) if source.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(io_error(&runs_root, source)),
        };

        let mut latest: Option<RunRecord> = None;
        for entry in entries {
            let entry = entry.map_err(|source| io_error(&runs_root, source))?;
            let path = entry.path().join("state.json");
            if !path.is_file() {
                continue;
            }
            let raw = fs::read_to_string(&path).map_err(|source| io_error(&path, source))?;
            let record: RunRecord =
                serde_json::from_str(&raw).map_err(|source| json_error(&path, source))?;
            if record.request_fingerprint != fingerprint {
                continue;
            }
            let newer = latest
                .as_ref()
                .map(|current| record.persisted_at > current.persisted_at)
                .unwrap_or(true);
            if newer {
                latest = Some(record);
            }
        }
        Ok(latest)
    }
}
