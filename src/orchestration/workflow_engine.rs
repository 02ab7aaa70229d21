use crate::config::{EnforcementMode, Settings};
use crate::guardrail::ToolCallGuardrail;
use crate::orchestration::collaborators::{CodeGenerator, CodeIntelligence, ToolExecutor};
use crate::orchestration::error::{io_error, WorkflowError};
use crate::orchestration::error_handling::{ErrorHandler, Recovery};
use crate::orchestration::hooks::{AfterModelCall, BeforeToolCall};
use crate::orchestration::phase::Phase;
use crate::orchestration::phases::{run_phase, PhaseContext, PhaseFailure};
use crate::orchestration::state::{ErrorRecord, PhaseState, TransitionRecord};
use crate::scope::PathComparison;
use crate::shared::logging::{append_engine_log_line, engine_log_path};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared stop request, checked only between phases.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Final state of a workflow plus the error that stopped it, if any.
#[derive(Debug)]
pub struct WorkflowOutcome {
    pub state: PhaseState,
    pub failure: Option<WorkflowError>,
}

impl WorkflowOutcome {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none() && self.state.current_phase == Phase::Done
    }
}

/// Drives one workflow through its phases. Owns the only mutable `PhaseState`.
pub struct WorkflowScheduler {
    context: PhaseContext,
    after_model_call: Vec<Arc<dyn AfterModelCall>>,
    error_handler: ErrorHandler,
    cancellation: CancellationFlag,
}

impl WorkflowScheduler {
    pub fn new(
        settings: Settings,
        intelligence: Arc<dyn CodeIntelligence>,
        generator: Arc<dyn CodeGenerator>,
        executor: Arc<dyn ToolExecutor>,
    ) -> Self {
        let comparison = if settings.guardrail.case_insensitive {
            PathComparison::CaseInsensitive
        } else {
            PathComparison::CaseSensitive
        };
        let guardrail = ToolCallGuardrail::new(settings.guardrail.mode, comparison);
        let error_handler = ErrorHandler::new(settings.limits);
        Self {
            context: PhaseContext {
                settings,
                intelligence,
                generator,
                executor,
                guardrail: Some(guardrail),
                before_tool_call: Vec::new(),
                state_root: None,
            },
            after_model_call: Vec::new(),
            error_handler,
            cancellation: CancellationFlag::new(),
        }
    }

    pub fn with_enforcement(mut self, mode: EnforcementMode) -> Self {
        if let Some(guardrail) = self.context.guardrail.as_mut() {
            guardrail.mode = mode;
        }
        self
    }

    /// Forwards every call unchecked. Debug use only.
    pub fn without_guardrail(mut self) -> Self {
        self.context.guardrail = None;
        self
    }

    pub fn with_state_root(mut self, state_root: impl Into<PathBuf>) -> Self {
        self.context.state_root = Some(state_root.into());
        self
    }

    pub fn with_before_tool_call(mut self, hook: Arc<dyn BeforeToolCall>) -> Self {
        self.context.before_tool_call.push(hook);
        self
    }

    pub fn with_after_model_call(mut self, hook: Arc<dyn AfterModelCall>) -> Self {
        self.after_model_call.push(hook);
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationFlag) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn cancellation(&self) -> CancellationFlag {
        self.cancellation.clone()
    }

    pub fn settings(&self) -> &Settings {
        &self.context.settings
    }

    pub fn guardrail(&self) -> Option<ToolCallGuardrail> {
        self.context.guardrail
    }

    pub fn run(
        &self,
        run_id: &str,
        codebase_root: &Path,
        feature_request: &str,
    ) -> Result<WorkflowOutcome, WorkflowError> {
        let state = PhaseState::new(run_id, codebase_root, feature_request);
        let guardrail = match self.context.guardrail {
            Some(guardrail) => guardrail.mode.as_str(),
            None => "disabled",
        };
        tracing::info!(run_id, root = %codebase_root.display(), guardrail, "workflow started");
        self.append_engine_log(
            run_id,
            &format!(
                "event=started root={} guardrail={guardrail}",
                codebase_root.display()
            ),
        )?;
        self.drive(state)
    }

    /// Runs phases from `state.current_phase` until `Done` or an aborted failure.
    pub fn drive(&self, mut state: PhaseState) -> Result<WorkflowOutcome, WorkflowError> {
        loop {
            let phase = state.current_phase;
            match phase {
                Phase::Done => {
                    self.append_engine_log(&state.run_id, "event=completed")?;
                    tracing::info!(run_id = %state.run_id, "workflow completed");
                    return Ok(WorkflowOutcome {
                        state,
                        failure: None,
                    });
                }
                Phase::ErrorHandling => {
                    return Ok(WorkflowOutcome {
                        state,
                        failure: Some(WorkflowError::InvalidTransition {
                            from: Phase::ErrorHandling,
                            to: Phase::ErrorHandling,
                        }),
                    });
                }
                _ => {}
            }

            if self.cancellation.is_cancelled() {
                let failure = PhaseFailure::from(WorkflowError::Cancelled { phase });
                if let Some(error) = self.handle_failure(&mut state, phase, failure)? {
                    return Ok(WorkflowOutcome {
                        state,
                        failure: Some(error),
                    });
                }
                continue;
            }

            let result = match run_phase(&self.context, phase, state.clone()) {
                Ok(outcome) if phase.can_transition_to(outcome.next) => Ok(outcome),
                Ok(outcome) => Err(PhaseFailure {
                    error: WorkflowError::InvalidTransition {
                        from: phase,
                        to: outcome.next,
                    },
                    partial: outcome.delta,
                }),
                Err(failure) => Err(failure),
            };

            match result {
                Ok(outcome) => {
                    state = state.apply(phase, outcome.delta);
                    let summary = summarize(phase, &state);
                    self.transition(&mut state, outcome.next, summary)?;
                    if matches!(
                        phase,
                        Phase::ContextAnalysis
                            | Phase::IntentParsing
                            | Phase::ImpactAnalysis
                            | Phase::CodeSynthesis
                    ) {
                        for hook in &self.after_model_call {
                            hook.after_model_call(phase, &state);
                        }
                    }
                }
                Err(failure) => {
                    if let Some(error) = self.handle_failure(&mut state, phase, failure)? {
                        return Ok(WorkflowOutcome {
                            state,
                            failure: Some(error),
                        });
                    }
                }
            }
        }
    }

    /// Merges what the failed phase produced, enters `ErrorHandling`, and either
    /// re-enters the phase (returns `None`) or gives up (returns the error).
    fn handle_failure(
        &self,
        state: &mut PhaseState,
        phase: Phase,
        failure: PhaseFailure,
    ) -> Result<Option<WorkflowError>, WorkflowError> {
        let PhaseFailure { error, mut partial } = failure;
        let recovery = self.error_handler.route(&error, phase, state);
        if matches!(recovery, Recovery::Retry(_)) {
            partial.supersede_tool_calls();
        }
        partial.errors.push(ErrorRecord::from_error(phase, &error));
        *state = state.apply(phase, partial);
        tracing::error!(run_id = %state.run_id, phase = %phase, kind = error.kind(), "{error}");
        self.transition(state, Phase::ErrorHandling, format!("{}: {error}", error.kind()))?;

        match recovery {
            Recovery::Retry(target) => {
                *state.phase_retries.entry(target).or_insert(0) += 1;
                self.transition(state, target, format!("retrying after {}", error.kind()))?;
                Ok(None)
            }
            Recovery::Abort => {
                self.append_engine_log(
                    &state.run_id,
                    &format!("event=aborted phase={phase} kind={}", error.kind()),
                )?;
                Ok(Some(error))
            }
        }
    }

    fn transition(
        &self,
        state: &mut PhaseState,
        to: Phase,
        summary: String,
    ) -> Result<(), WorkflowError> {
        let from = state.current_phase;
        if !from.can_transition_to(to) {
            return Err(WorkflowError::InvalidTransition { from, to });
        }
        state.current_phase = to;
        tracing::debug!(run_id = %state.run_id, %from, %to, "{summary}");
        self.append_engine_log(
            &state.run_id,
            &format!("event=transition from={from} to={to} summary=\"{summary}\""),
        )?;
        state.transitions.push(TransitionRecord {
            from,
            to,
            at: chrono::Utc::now().to_rfc3339(),
            summary,
        });
        Ok(())
    }

    fn append_engine_log(&self, run_id: &str, message: &str) -> Result<(), WorkflowError> {
        let Some(state_root) = &self.context.state_root else {
            return Ok(());
        };
        let line = format!(
            "ts={} run_id={run_id} {message}",
            chrono::Utc::now().timestamp()
        );
        append_engine_log_line(state_root, run_id, &line)
            .map_err(|source| io_error(&engine_log_path(state_root, run_id), source))
    }
}

fn summarize(phase: Phase, state: &PhaseState) -> String {
    let summary = match phase {
        Phase::ContextAnalysis => {
            format!("{} discovered files", state.discovered_files.len())
        }
        Phase::IntentParsing => {
            let (files, tasks) = state
                .feature_spec
                .as_ref()
                .map(|spec| (spec.affected_files.len(), spec.tasks.len()))
                .unwrap_or_default();
            format!("{files} affected files, {tasks} tasks")
        }
        Phase::StructureValidation => format!("{} violations", state.violations.len()),
        Phase::ImpactAnalysis => {
            let files = state
                .impact_analysis
                .as_ref()
                .map(|impact| impact.files.len())
                .unwrap_or_default();
            format!("{files} impacted files")
        }
        Phase::CodeSynthesis => format!(
            "{} forwarded, {} refused",
            state.forwarded_calls().count(),
            state.refused_calls().count()
        ),
        Phase::Execution => {
            let applied = state
                .patches_applied
                .iter()
                .filter(|patch| patch.success)
                .count();
            format!("{applied}/{} patches applied", state.patches_applied.len())
        }
        Phase::ErrorHandling | Phase::Done => String::new(),
    };
    if state.is_degraded(phase) {
        format!("{summary} (degraded)")
    } else {
        summary
    }
}
