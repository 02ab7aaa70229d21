use crate::config::WorkflowLimits;
use crate::orchestration::error::WorkflowError;
use crate::orchestration::phase::Phase;
use crate::orchestration::state::PhaseState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    Retry(Phase),
    Abort,
}

#[derive(Debug, Clone, Copy)]
pub struct ErrorHandler {
    limits: WorkflowLimits,
}

impl ErrorHandler {
    pub fn new(limits: WorkflowLimits) -> Self {
        Self { limits }
    }

    pub fn route(&self, error: &WorkflowError, failed_phase: Phase, state: &PhaseState) -> Recovery {
        if !self.limits.recover_from_errors || !error.is_retryable() || failed_phase.is_terminal() {
            return Recovery::Abort;
        }
        // Calls from an interrupted execution may still land; never replay them.
        if failed_phase == Phase::Execution {
            return Recovery::Abort;
        }
        let used = state
            .phase_retries
            .get(&failed_phase)
            .copied()
            .unwrap_or(0);
        if used >= self.limits.max_phase_retries {
            return Recovery::Abort;
        }
        Recovery::Retry(failed_phase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collaborator_error() -> WorkflowError {
        WorkflowError::Collaborator {
            phase: Phase::ImpactAnalysis,
            reason: "unavailable".to_string(),
        }
    }

    fn limits(recover: bool) -> WorkflowLimits {
        WorkflowLimits {
            recover_from_errors: recover,
            max_phase_retries: 1,
            ..WorkflowLimits::default()
        }
    }

    #[test]
    fn recovery_disabled_aborts() {
        let state = PhaseState::new("r", "/p", "x");
        let handler = ErrorHandler::new(limits(false));
        assert_eq!(
            handler.route(&collaborator_error(), Phase::ImpactAnalysis, &state),
            Recovery::Abort
        );
    }

    #[test]
    fn retryable_error_retries_until_budget_is_spent() {
        let mut state = PhaseState::new("r", "/p", "x");
        let handler = ErrorHandler::new(limits(true));
        assert_eq!(
            handler.route(&collaborator_error(), Phase::ImpactAnalysis, &state),
            Recovery::Retry(Phase::ImpactAnalysis)
        );
        state.phase_retries.insert(Phase::ImpactAnalysis, 1);
        assert_eq!(
            handler.route(&collaborator_error(), Phase::ImpactAnalysis, &state),
            Recovery::Abort
        );
    }

    #[test]
    fn execution_is_never_replayed() {
        let state = PhaseState::new("r", "/p", "x");
        let handler = ErrorHandler::new(limits(true));
        let timeout = WorkflowError::TimeoutDegraded {
            phase: Phase::Execution,
            deadline_ms: 1000,
        };
        assert_eq!(handler.route(&timeout, Phase::Execution, &state), Recovery::Abort);
        let lost = WorkflowError::Collaborator {
            phase: Phase::Execution,
            reason: "worker exited".to_string(),
        };
        assert_eq!(handler.route(&lost, Phase::Execution, &state), Recovery::Abort);
    }

    #[test]
    fn structural_errors_are_never_retried() {
        let state = PhaseState::new("r", "/p", "x");
        let handler = ErrorHandler::new(limits(true));
        let missing = WorkflowError::UpstreamDataMissing {
            phase: Phase::CodeSynthesis,
            field: "feature_spec".to_string(),
        };
        assert_eq!(
            handler.route(&missing, Phase::CodeSynthesis, &state),
            Recovery::Abort
        );
    }
}
