use crate::config::ConfigError;
use crate::guardrail::GuardrailRefusal;
use crate::orchestration::phase::Phase;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("tool call `{tool}` has no resolvable path")]
    ExtractionFailure { tool: String },
    #[error("scope violation: {refusal}")]
    ScopeViolation { refusal: Box<GuardrailRefusal> },
    #[error("phase `{phase}` timed out after {deadline_ms}ms with no fallback left")]
    TimeoutDegraded { phase: Phase, deadline_ms: u128 },
    #[error("phase `{phase}` requires `{field}` from an earlier phase")]
    UpstreamDataMissing { phase: Phase, field: String },
    #[error("proposed tool call rejected: {reason}")]
    Validation { reason: String },
    #[error("structure validation found high-severity violations: {summary}")]
    StructureRejected { summary: String },
    #[error("collaborator failed during `{phase}`: {reason}")]
    Collaborator { phase: Phase, reason: String },
    #[error("phase transition `{from}` -> `{to}` is invalid")]
    InvalidTransition { from: Phase, to: Phase },
    #[error("tool call retry limit exceeded (max {max_retries}); last refusal: {last_refusal}")]
    RetryLimitExceeded {
        max_retries: u32,
        last_refusal: String,
    },
    #[error("workflow cancelled before `{phase}`")]
    Cancelled { phase: Phase },
    #[error("config error: {0}")]
    Config(String),
    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("json error at {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl WorkflowError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ExtractionFailure { .. } => "extraction_failure",
            Self::ScopeViolation { .. } => "scope_violation",
            Self::TimeoutDegraded { .. } => "timeout_degraded",
            Self::UpstreamDataMissing { .. } => "upstream_data_missing",
            Self::Validation { .. } => "validation",
            Self::StructureRejected { .. } => "structure_rejected",
            Self::Collaborator { .. } => "collaborator",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::RetryLimitExceeded { .. } => "retry_limit_exceeded",
            Self::Cancelled { .. } => "cancelled",
            Self::Config(_) => "config",
            Self::Io { .. } => "io",
            Self::Json { .. } => "json",
        }
    }

    /// Errors worth re-entering the failed phase for.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TimeoutDegraded { .. } | Self::Collaborator { .. } | Self::Io { .. }
        )
    }
}

impl From<ConfigError> for WorkflowError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value.to_string())
    }
}

pub(crate) fn io_error(path: &Path, source: std::io::Error) -> WorkflowError {
    WorkflowError::Io {
        path: path.display().to_string(),
        source,
    }
}

pub(crate) fn json_error(path: &Path, source: serde_json::Error) -> WorkflowError {
    WorkflowError::Json {
        path: path.display().to_string(),
        source,
    }
}
