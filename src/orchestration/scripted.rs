//! Collaborators that replay a feature-request spec file instead of calling
//! a model, so the workflow can run end to end from the command line.

use crate::guardrail::GuardrailRefusal;
use crate::orchestration::collaborators::{
    CodeGenerator, CodeIntelligence, ContextAnalysis, Effort, FeatureSpec, ImpactAnalysis,
    ProposedToolCall,
};
use crate::orchestration::error::{io_error, WorkflowError};
use crate::orchestration::state::PhaseState;
use crate::scope::ScopeSet;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::path::Path;
use std::sync::Mutex;

const FULL_SCAN_DEPTH: usize = 6;
const FULL_SCAN_LIMIT: usize = 2000;
const REDUCED_SCAN_DEPTH: usize = 2;
const REDUCED_SCAN_LIMIT: usize = 200;
const MAX_CONTENT_BYTES: u64 = 256 * 1024;

/// On-disk description of a feature request and the agent output to replay.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureRequestSpec {
    pub request: String,
    #[serde(default)]
    pub intent_summary: Option<String>,
    #[serde(default)]
    pub affected_files: Vec<String>,
    #[serde(default)]
    pub tasks: Vec<String>,
    /// Refined file list; falls back to `affected_files` when absent.
    #[serde(default)]
    pub impact_files: Option<Vec<String>>,
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub tool_calls: Vec<ProposedToolCall>,
    /// Replacement calls offered, in order, after each refusal.
    #[serde(default)]
    pub revisions: Vec<ProposedToolCall>,
}

impl FeatureRequestSpec {
    /// Reads YAML or JSON (JSON is valid YAML).
    pub fn from_path(path: &Path) -> Result<Self, WorkflowError> {
        let raw = fs::read_to_string(path).map_err(|source| io_error(path, source))?;
        let spec: Self = serde_yaml::from_str(&raw).map_err(|source| {
            WorkflowError::Config(format!(
                "invalid feature request spec {}: {source}",
                path.display()
            ))
        })?;
        if spec.request.trim().is_empty() {
            return Err(WorkflowError::Config(format!(
                "feature request spec {} has an empty `request`",
                path.display()
            )));
        }
        Ok(spec)
    }

    /// A bare request string: nothing to replay beyond the text itself.
    pub fn from_request(request: &str) -> Self {
        Self {
            request: request.trim().to_string(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReplayIntelligence {
    spec: FeatureRequestSpec,
}

impl ReplayIntelligence {
    pub fn new(spec: FeatureRequestSpec) -> Self {
        Self { spec }
    }
}

impl CodeIntelligence for ReplayIntelligence {
    fn analyze_context(
        &self,
        codebase_root: &Path,
        _feature_request: &str,
        effort: Effort,
    ) -> Result<ContextAnalysis, String> {
        let (depth, limit) = match effort {
            Effort::Full => (FULL_SCAN_DEPTH, FULL_SCAN_LIMIT),
            Effort::Reduced => (REDUCED_SCAN_DEPTH, REDUCED_SCAN_LIMIT),
        };
        let mut files = Vec::new();
        scan_workspace(codebase_root, codebase_root, depth, limit, &mut files)
            .map_err(|err| format!("failed to scan {}: {err}", codebase_root.display()))?;
        files.sort();

        let mut file_contents = BTreeMap::new();
        if effort == Effort::Full {
            for raw in &self.spec.affected_files {
                let path = codebase_root.join(raw.trim());
                let small = fs::metadata(&path)
                    .map(|meta| meta.is_file() && meta.len() <= MAX_CONTENT_BYTES)
                    .unwrap_or(false);
                if !small {
                    continue;
                }
                if let Ok(content) = fs::read_to_string(&path) {
                    file_contents.insert(raw.trim().to_string(), content);
                }
            }
        }

        Ok(ContextAnalysis {
            summary: format!(
                "scanned {} files under {}{}",
                files.len(),
                codebase_root.display(),
                if files.len() >= limit { " (truncated)" } else { "" }
            ),
            files,
            file_contents,
        })
    }

    fn parse_intent(
        &self,
        feature_request: &str,
        _context: &ContextAnalysis,
        _effort: Effort,
    ) -> Result<FeatureSpec, String> {
        let intent_summary = self
            .spec
            .intent_summary
            .clone()
            .unwrap_or_else(|| {
                feature_request
                    .lines()
                    .find(|line| !line.trim().is_empty())
                    .unwrap_or_default()
                    .trim()
                    .to_string()
            });
        Ok(FeatureSpec {
            intent_summary,
            affected_files: self.spec.affected_files.clone(),
            tasks: self.spec.tasks.clone(),
        })
    }

    fn analyze_impact(
        &self,
        spec: &FeatureSpec,
        _context: &ContextAnalysis,
        _effort: Effort,
    ) -> Result<ImpactAnalysis, String> {
        Ok(ImpactAnalysis {
            files: self
                .spec
                .impact_files
                .clone()
                .unwrap_or_else(|| spec.affected_files.clone()),
            patterns: self.spec.patterns.clone(),
            constraints: self.spec.constraints.clone(),
        })
    }
}

#[derive(Debug)]
pub struct ReplayGenerator {
    tool_calls: Vec<ProposedToolCall>,
    revisions: Mutex<VecDeque<ProposedToolCall>>,
}

impl ReplayGenerator {
    pub fn new(spec: &FeatureRequestSpec) -> Self {
        Self {
            tool_calls: spec.tool_calls.clone(),
            revisions: Mutex::new(spec.revisions.iter().cloned().collect()),
        }
    }
}

impl CodeGenerator for ReplayGenerator {
    fn propose_tool_calls(
        &self,
        _state: &PhaseState,
        _scope: &ScopeSet,
        _effort: Effort,
    ) -> Result<Vec<ProposedToolCall>, String> {
        Ok(self.tool_calls.clone())
    }

    fn revise_after_refusal(&self, refusal: &GuardrailRefusal) -> Option<ProposedToolCall> {
        tracing::debug!(refusal = %refusal, "replaying next revision");
        self.revisions.lock().ok()?.pop_front()
    }
}

/// Collects root-relative file paths, skipping hidden entries and build output.
fn scan_workspace(
    root: &Path,
    dir: &Path,
    depth: usize,
    limit: usize,
    files: &mut Vec<String>,
) -> std::io::Result<()> {
    let mut entries: Vec<_> = fs::read_dir(dir)?.filter_map(Result::ok).collect();
    entries.sort_by_key(|entry| entry.file_name());
    for entry in entries {
        if files.len() >= limit {
            return Ok(());
        }
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with('.') || matches!(name.as_ref(), "target" | "node_modules" | "build") {
            continue;
        }
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            if depth > 0 {
                scan_workspace(root, &path, depth - 1, limit, files)?;
            }
        } else if file_type.is_file() {
            if let Ok(relative) = path.strip_prefix(root) {
                files.push(relative.to_string_lossy().replace('\\', "/"));
            }
        }
    }
    Ok(())
}
