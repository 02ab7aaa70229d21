use super::cli::{Cli, EXIT_FATAL, EXIT_USAGE};
use crate::config::{load_settings, resolve_codebase_root, resolve_state_dir, EnforcementMode};
use crate::guardrail::Verdict;
use crate::orchestration::{
    DryRunExecutor, FeatureRequestSpec, FsToolExecutor, ReplayGenerator, ReplayIntelligence,
    RunRecord, RunStore, ToolExecutor, TracingHook, WorkflowOutcome, WorkflowScheduler,
};
use crate::shared::ids::generate_run_id;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("invalid usage: {0}")]
    Usage(String),
    #[error("{0}")]
    Fatal(String),
}

impl AppError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Usage(_) => EXIT_USAGE,
            Self::Fatal(_) => EXIT_FATAL,
        }
    }
}

/// Runs one workflow for the parsed command line and returns the printed report.
pub fn execute(cli: &Cli) -> Result<String, AppError> {
    let root = resolve_codebase_root(&cli.codebase_path)
        .map_err(|err| AppError::Usage(err.to_string()))?;
    let mut settings = load_settings(&root, cli.config.as_deref())
        .map_err(|err| AppError::Usage(err.to_string()))?;
    if cli.soft_guardrail {
        settings.guardrail.mode = EnforcementMode::Soft;
    }

    let spec = match (&cli.feature_request_spec, &cli.feature_request) {
        (Some(path), _) => {
            FeatureRequestSpec::from_path(path).map_err(|err| AppError::Usage(err.to_string()))?
        }
        (None, Some(text)) if !text.trim().is_empty() => FeatureRequestSpec::from_request(text),
        (None, _) => {
            return Err(AppError::Usage(
                "--feature-request must not be empty".to_string(),
            ))
        }
    };

    let state_dir = resolve_state_dir(
        &root,
        cli.state_dir.as_deref(),
        settings.state_dir.as_deref(),
    );
    let run_store = RunStore::new(&state_dir);
    match run_store.latest_for_request(&spec.request) {
        Ok(Some(previous)) => tracing::info!(
            previous_run = %previous.run_id,
            status = %previous.status,
            "same feature request was run before"
        ),
        Ok(None) => {}
        Err(err) => tracing::warn!(error = %err, "could not inspect previous runs"),
    }

    let run_id = generate_run_id(chrono::Utc::now().timestamp()).map_err(AppError::Fatal)?;
    let executor: Arc<dyn ToolExecutor> = if cli.dry_run {
        Arc::new(DryRunExecutor)
    } else {
        Arc::new(FsToolExecutor::new(&root))
    };

    let mut scheduler = WorkflowScheduler::new(
        settings,
        Arc::new(ReplayIntelligence::new(spec.clone())),
        Arc::new(ReplayGenerator::new(&spec)),
        executor,
    )
    .with_state_root(&state_dir)
    .with_before_tool_call(Arc::new(TracingHook))
    .with_after_model_call(Arc::new(TracingHook));
    if cli.no_guardrail {
        tracing::warn!("guardrail disabled; every tool call is forwarded unchecked");
        scheduler = scheduler.without_guardrail();
    }

    let outcome = scheduler
        .run(&run_id, &root, &spec.request)
        .map_err(|err| AppError::Fatal(err.to_string()))?;
    let record = RunRecord::from_outcome(&outcome);
    let state_path = run_store
        .persist(&record)
        .map_err(|err| AppError::Fatal(err.to_string()))?;

    let report = render_report(&outcome, &state_path);
    if outcome.succeeded() {
        Ok(report)
    } else {
        Err(AppError::Fatal(report))
    }
}

pub fn render_report(outcome: &WorkflowOutcome, state_path: &Path) -> String {
    let state = &outcome.state;
    let mut out = String::new();
    let status = if outcome.succeeded() {
        "succeeded"
    } else {
        "failed"
    };
    let _ = writeln!(out, "run {} {status} at phase {}", state.run_id, state.current_phase);
    if !state.degraded_phases.is_empty() {
        let degraded: Vec<&str> = state.degraded_phases.iter().map(|p| p.as_str()).collect();
        let _ = writeln!(out, "degraded phases: {}", degraded.join(", "));
    }
    for violation in &state.violations {
        let _ = writeln!(
            out,
            "violation [{:?}] {}: {}",
            violation.severity, violation.kind, violation.message
        );
    }
    if let Some(scope) = &state.proposed_scope {
        let _ = writeln!(out, "allowed scope: {}", scope.describe());
    }
    for guarded in state.refused_calls() {
        let _ = writeln!(
            out,
            "blocked: {}",
            guarded.refusal.as_deref().unwrap_or("refused")
        );
    }
    for entry in state.guardrail_log.warnings() {
        let _ = writeln!(
            out,
            "warning: {} on `{}` allowed outside scope ({})",
            entry.tool,
            entry.path.as_deref().unwrap_or("-"),
            entry.matched_rule
        );
    }
    for patch in &state.patches_applied {
        let marker = if patch.success { "ok" } else { "failed" };
        let _ = writeln!(
            out,
            "{marker}: {} {}: {}",
            patch.tool,
            patch.path.as_deref().unwrap_or("-"),
            patch.message
        );
    }
    if let Some(failure) = &outcome.failure {
        let _ = writeln!(out, "error: {failure}");
        let blocked = state
            .guardrail_log
            .entries()
            .iter()
            .filter(|entry| entry.verdict == Verdict::Block)
            .filter_map(|entry| entry.path.clone())
            .collect::<Vec<_>>();
        if !blocked.is_empty() {
            let _ = writeln!(out, "denied paths: {}", blocked.join(", "));
        }
    }
    let _ = write!(out, "state: {}", state_path.display());
    out
}
