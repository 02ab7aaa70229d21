use crate::guardrail::{GuardrailAuditLog, GuardrailDecision, ToolCall};
use crate::orchestration::collaborators::{
    ContextAnalysis, FeatureSpec, ImpactAnalysis, PatchResult,
};
use crate::orchestration::error::WorkflowError;
use crate::orchestration::phase::Phase;
use crate::orchestration::structure::Violation;
use crate::scope::ScopeSet;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// A proposed call together with what the guardrail made of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardedToolCall {
    pub call: ToolCall,
    /// `None` when the guardrail was disabled for this run.
    pub decision: Option<GuardrailDecision>,
    pub forwarded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refusal: Option<String>,
    /// Set when the synthesis attempt that produced this call was retried.
    /// Kept for audit; never executed.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub superseded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub phase: Phase,
    pub kind: String,
    pub message: String,
}

impl ErrorRecord {
    pub fn from_error(phase: Phase, error: &WorkflowError) -> Self {
        Self {
            phase,
            kind: error.kind().to_string(),
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: Phase,
    pub to: Phase,
    pub at: String,
    pub summary: String,
}

/// Everything a workflow has accumulated so far. Owned by the scheduler;
/// phases only ever see clones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseState {
    pub run_id: String,
    pub codebase_root: PathBuf,
    pub feature_request: String,
    pub current_phase: Phase,
    #[serde(default)]
    pub discovered_files: BTreeSet<PathBuf>,
    #[serde(default)]
    pub context_analysis: Option<ContextAnalysis>,
    #[serde(default)]
    pub feature_spec: Option<FeatureSpec>,
    #[serde(default)]
    pub violations: Vec<Violation>,
    #[serde(default)]
    pub impact_analysis: Option<ImpactAnalysis>,
    #[serde(default)]
    pub proposed_scope: Option<ScopeSet>,
    #[serde(default)]
    pub tool_calls: Vec<GuardedToolCall>,
    #[serde(default)]
    pub patches_applied: Vec<PatchResult>,
    #[serde(default)]
    pub errors: Vec<ErrorRecord>,
    #[serde(default)]
    pub degraded_phases: BTreeSet<Phase>,
    #[serde(default)]
    pub tool_call_retries: u32,
    #[serde(default)]
    pub phase_retries: BTreeMap<Phase, u32>,
    #[serde(default)]
    pub guardrail_log: GuardrailAuditLog,
    #[serde(default)]
    pub transitions: Vec<TransitionRecord>,
}

impl PhaseState {
    pub fn new(
        run_id: impl Into<String>,
        codebase_root: impl Into<PathBuf>,
        feature_request: impl Into<String>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            codebase_root: codebase_root.into(),
            feature_request: feature_request.into(),
            current_phase: Phase::INITIAL,
            discovered_files: BTreeSet::new(),
            context_analysis: None,
            feature_spec: None,
            violations: Vec::new(),
            impact_analysis: None,
            proposed_scope: None,
            tool_calls: Vec::new(),
            patches_applied: Vec::new(),
            errors: Vec::new(),
            degraded_phases: BTreeSet::new(),
            tool_call_retries: 0,
            phase_retries: BTreeMap::new(),
            guardrail_log: GuardrailAuditLog::default(),
            transitions: Vec::new(),
        }
    }

    /// Clones the whole state and layers `delta` on top. Fields the delta
    /// leaves empty keep their previous value; list fields only grow.
    pub fn apply(&self, phase: Phase, delta: PhaseDelta) -> Self {
        let mut next = self.clone();
        next.discovered_files.extend(delta.discovered_files);
        if let Some(context) = delta.context_analysis {
            next.context_analysis = Some(context);
        }
        if let Some(spec) = delta.feature_spec {
            next.feature_spec = Some(spec);
        }
        next.violations.extend(delta.violations);
        if let Some(impact) = delta.impact_analysis {
            next.impact_analysis = Some(impact);
        }
        if let Some(scope) = delta.proposed_scope {
            next.proposed_scope = Some(scope);
        }
        next.tool_calls.extend(delta.tool_calls);
        next.patches_applied.extend(delta.patches_applied);
        next.errors.extend(delta.errors);
        if delta.degraded {
            next.degraded_phases.insert(phase);
        }
        if let Some(retries) = delta.tool_call_retries {
            next.tool_call_retries = retries;
        }
        if let Some(log) = delta.guardrail_log {
            next.guardrail_log = log;
        }
        next
    }

    pub fn is_degraded(&self, phase: Phase) -> bool {
        self.degraded_phases.contains(&phase)
    }

    pub fn forwarded_calls(&self) -> impl Iterator<Item = &GuardedToolCall> {
        self.tool_calls
            .iter()
            .filter(|guarded| guarded.forwarded && !guarded.superseded)
    }

    pub fn refused_calls(&self) -> impl Iterator<Item = &GuardedToolCall> {
        self.tool_calls.iter().filter(|guarded| !guarded.forwarded)
    }
}

/// Explicit overrides a phase hands back to the scheduler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhaseDelta {
    pub discovered_files: BTreeSet<PathBuf>,
    pub context_analysis: Option<ContextAnalysis>,
    pub feature_spec: Option<FeatureSpec>,
    pub violations: Vec<Violation>,
    pub impact_analysis: Option<ImpactAnalysis>,
    pub proposed_scope: Option<ScopeSet>,
    pub tool_calls: Vec<GuardedToolCall>,
    pub patches_applied: Vec<PatchResult>,
    pub errors: Vec<ErrorRecord>,
    pub degraded: bool,
    pub tool_call_retries: Option<u32>,
    pub guardrail_log: Option<GuardrailAuditLog>,
}

impl PhaseDelta {
    /// Marks every call in this delta as belonging to an abandoned attempt.
    pub fn supersede_tool_calls(&mut self) {
        for guarded in &mut self.tool_calls {
            guarded.superseded = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn seeded() -> PhaseState {
        let mut state = PhaseState::new("run-1", "/proj", "add login");
        state.discovered_files.insert(PathBuf::from("/proj/src/a.rs"));
        state.context_analysis = Some(ContextAnalysis {
            summary: "one file".to_string(),
            files: vec!["src/a.rs".to_string()],
            file_contents: BTreeMap::from([("src/a.rs".to_string(), "fn a() {}".to_string())]),
        });
        state.errors.push(ErrorRecord {
            phase: Phase::IntentParsing,
            kind: "collaborator".to_string(),
            message: "flaky".to_string(),
        });
        state
    }

    #[test]
    fn empty_delta_changes_nothing() {
        let state = seeded();
        assert_eq!(state.apply(Phase::IntentParsing, PhaseDelta::default()), state);
    }

    #[test]
    fn lists_append_and_options_override() {
        let state = seeded();
        let next = state.apply(
            Phase::StructureValidation,
            PhaseDelta {
                discovered_files: BTreeSet::from([PathBuf::from("/proj/src/b.rs")]),
                errors: vec![ErrorRecord {
                    phase: Phase::StructureValidation,
                    kind: "validation".to_string(),
                    message: "x".to_string(),
                }],
                degraded: true,
                ..PhaseDelta::default()
            },
        );
        assert_eq!(next.discovered_files.len(), 2);
        assert_eq!(next.errors.len(), 2);
        assert!(next.is_degraded(Phase::StructureValidation));
        assert_eq!(next.context_analysis, state.context_analysis);
    }

    fn guarded(path: &str, forwarded: bool) -> GuardedToolCall {
        let args = BTreeMap::from([("path".to_string(), path.to_string())]);
        GuardedToolCall {
            call: ToolCall::from_args(crate::guardrail::ToolName::Write, args, Path::new("/proj")),
            decision: None,
            forwarded,
            refusal: None,
            superseded: false,
        }
    }

    #[test]
    fn superseded_calls_are_not_forwarded() {
        let mut delta = PhaseDelta {
            tool_calls: vec![guarded("src/a.rs", true), guarded("tmp/x.rs", false)],
            ..PhaseDelta::default()
        };
        delta.supersede_tool_calls();
        let state = PhaseState::new("run-1", "/proj", "x").apply(Phase::CodeSynthesis, delta);
        let next = state.apply(
            Phase::CodeSynthesis,
            PhaseDelta {
                tool_calls: vec![guarded("src/a.rs", true)],
                ..PhaseDelta::default()
            },
        );
        assert_eq!(next.tool_calls.len(), 3);
        assert_eq!(next.forwarded_calls().count(), 1);
        assert!(next.tool_calls[0].superseded);
    }

    #[test]
    fn file_contents_are_not_serialized() {
        let json = serde_json::to_string(&seeded()).expect("encode");
        assert!(!json.contains("fn a() {}"));
        let back: PhaseState = serde_json::from_str(&json).expect("decode");
        assert_eq!(back.discovered_files, seeded().discovered_files);
        assert!(back
            .context_analysis
            .expect("context")
            .file_contents
            .is_empty());
    }
}
