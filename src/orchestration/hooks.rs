use crate::guardrail::ToolCall;
use crate::orchestration::phase::Phase;
use crate::orchestration::state::PhaseState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookVerdict {
    Continue,
    Veto(String),
}

/// Runs after the guardrail approves a call and before it is forwarded.
pub trait BeforeToolCall: Send + Sync {
    fn name(&self) -> &str;
    fn before_tool_call(&self, call: &ToolCall, state: &PhaseState) -> HookVerdict;
}

/// Runs after each collaborator-backed phase has been merged into state.
pub trait AfterModelCall: Send + Sync {
    fn name(&self) -> &str;
    fn after_model_call(&self, phase: Phase, state: &PhaseState);
}

/// Emits a debug event for every hook point.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingHook;

impl BeforeToolCall for TracingHook {
    fn name(&self) -> &str {
        "tracing"
    }

    fn before_tool_call(&self, call: &ToolCall, state: &PhaseState) -> HookVerdict {
        tracing::debug!(
            run_id = %state.run_id,
            tool = %call.name,
            path = call.display_path().as_deref().unwrap_or(""),
            "forwarding tool call"
        );
        HookVerdict::Continue
    }
}

impl AfterModelCall for TracingHook {
    fn name(&self) -> &str {
        "tracing"
    }

    fn after_model_call(&self, phase: Phase, state: &PhaseState) {
        tracing::debug!(
            run_id = %state.run_id,
            phase = %phase,
            discovered_files = state.discovered_files.len(),
            degraded = state.is_degraded(phase),
            "collaborator phase merged"
        );
    }
}
