use crate::config::{PhaseDeadlines, ScopeSettings, Settings, ViolationPolicy};
use crate::guardrail::{
    GuardrailAuditLog, GuardrailDecision, GuardrailRefusal, MatchedRule, ToolCall,
    ToolCallGuardrail, ToolName,
};
use crate::orchestration::collaborators::{
    CodeGenerator, CodeIntelligence, Effort, PatchResult, ProposedToolCall, ToolExecutor,
};
use crate::orchestration::error::{io_error, WorkflowError};
use crate::orchestration::hooks::{BeforeToolCall, HookVerdict};
use crate::orchestration::phase::Phase;
use crate::orchestration::state::{ErrorRecord, GuardedToolCall, PhaseDelta, PhaseState};
use crate::orchestration::structure::{has_high_severity, validate_structure, Severity};
use crate::orchestration::supervisor::{run_bounded, TimeoutSignal};
use crate::scope::{normalize, FsProbe, PathProbe, ScopeResolver, ScopeSet};
use crate::shared::logging::{append_security_log_line, security_log_path};
use std::collections::{BTreeSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Everything a phase step may use besides the state snapshot.
pub struct PhaseContext {
    pub settings: Settings,
    pub intelligence: Arc<dyn CodeIntelligence>,
    pub generator: Arc<dyn CodeGenerator>,
    pub executor: Arc<dyn ToolExecutor>,
    /// `None` disables guarding entirely.
    pub guardrail: Option<ToolCallGuardrail>,
    pub before_tool_call: Vec<Arc<dyn BeforeToolCall>>,
    pub state_root: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseOutcome {
    pub delta: PhaseDelta,
    pub next: Phase,
}

impl PhaseOutcome {
    fn advance(phase: Phase, delta: PhaseDelta) -> Result<Self, PhaseFailure> {
        let next = phase.successor().ok_or(WorkflowError::InvalidTransition {
            from: phase,
            to: phase,
        })?;
        Ok(Self { delta, next })
    }
}

/// A failed step. `partial` is merged before the workflow enters error handling
/// so work done up to the failure is kept.
#[derive(Debug)]
pub struct PhaseFailure {
    pub error: WorkflowError,
    pub partial: PhaseDelta,
}

impl From<WorkflowError> for PhaseFailure {
    fn from(error: WorkflowError) -> Self {
        Self {
            error,
            partial: PhaseDelta::default(),
        }
    }
}

pub fn deadline_for(deadlines: &PhaseDeadlines, phase: Phase) -> Duration {
    let seconds = match phase {
        Phase::ContextAnalysis => deadlines.context_analysis_seconds,
        Phase::IntentParsing => deadlines.intent_parsing_seconds,
        Phase::StructureValidation => deadlines.structure_validation_seconds,
        Phase::ImpactAnalysis => deadlines.impact_analysis_seconds,
        Phase::CodeSynthesis => deadlines.code_synthesis_seconds,
        Phase::Execution => deadlines.execution_seconds,
        Phase::ErrorHandling | Phase::Done => deadlines.fallback_seconds,
    };
    Duration::from_secs(seconds)
}

pub fn run_phase(
    context: &PhaseContext,
    phase: Phase,
    snapshot: PhaseState,
) -> Result<PhaseOutcome, PhaseFailure> {
    match phase {
        Phase::ContextAnalysis => context_analysis(context, snapshot),
        Phase::IntentParsing => intent_parsing(context, snapshot),
        Phase::StructureValidation => structure_validation(context, snapshot),
        Phase::ImpactAnalysis => impact_analysis(context, snapshot),
        Phase::CodeSynthesis => code_synthesis(context, snapshot),
        Phase::Execution => execution(context, snapshot),
        Phase::ErrorHandling | Phase::Done => Err(WorkflowError::InvalidTransition {
            from: phase,
            to: phase,
        }
        .into()),
    }
}

/// Runs a collaborator call under the phase deadline; on expiry retries once
/// with reduced effort under the fallback deadline. The flag reports degradation.
fn supervised<T, F>(context: &PhaseContext, phase: Phase, step: F) -> Result<(T, bool), WorkflowError>
where
    T: Send + 'static,
    F: Fn(Effort) -> Result<T, String> + Send + Sync + 'static,
{
    let step = Arc::new(step);
    let deadline = deadline_for(&context.settings.deadlines, phase);
    let collaborator = |reason: String| WorkflowError::Collaborator { phase, reason };

    let full = Arc::clone(&step);
    match run_bounded(phase.as_str(), deadline, move || full(Effort::Full)) {
        Ok(result) => result.map(|value| (value, false)).map_err(collaborator),
        Err(lost @ TimeoutSignal::WorkerLost { .. }) => Err(collaborator(lost.to_string())),
        Err(TimeoutSignal::Expired { .. }) => {
            tracing::warn!(phase = %phase, "phase deadline expired, retrying with reduced effort");
            let reduced = Arc::clone(&step);
            let label = format!("{phase}_fallback");
            match run_bounded(&label, context.settings.deadlines.fallback(), move || {
                reduced(Effort::Reduced)
            }) {
                Ok(result) => result.map(|value| (value, true)).map_err(collaborator),
                Err(lost @ TimeoutSignal::WorkerLost { .. }) => Err(collaborator(lost.to_string())),
                Err(TimeoutSignal::Expired { .. }) => Err(WorkflowError::TimeoutDegraded {
                    phase,
                    deadline_ms: deadline.as_millis(),
                }),
            }
        }
    }
}

fn missing(phase: Phase, field: &str) -> WorkflowError {
    WorkflowError::UpstreamDataMissing {
        phase,
        field: field.to_string(),
    }
}

fn discover(rules: &ScopeSettings, root: &Path, entries: &[String]) -> BTreeSet<PathBuf> {
    entries
        .iter()
        .filter(|raw| !rules.is_sentinel(raw))
        .map(|raw| normalize(root, raw))
        .collect()
}

fn context_analysis(context: &PhaseContext, snapshot: PhaseState) -> Result<PhaseOutcome, PhaseFailure> {
    let phase = Phase::ContextAnalysis;
    let intelligence = Arc::clone(&context.intelligence);
    let root = snapshot.codebase_root.clone();
    let request = snapshot.feature_request.clone();
    let (analysis, degraded) = supervised(context, phase, move |effort| {
        intelligence.analyze_context(&root, &request, effort)
    })?;
    let discovered_files = discover(&context.settings.scope, &snapshot.codebase_root, &analysis.files);
    PhaseOutcome::advance(
        phase,
        PhaseDelta {
            discovered_files,
            context_analysis: Some(analysis),
            degraded,
            ..PhaseDelta::default()
        },
    )
}

fn intent_parsing(context: &PhaseContext, snapshot: PhaseState) -> Result<PhaseOutcome, PhaseFailure> {
    let phase = Phase::IntentParsing;
    let analysis = snapshot
        .context_analysis
        .clone()
        .ok_or_else(|| missing(phase, "context_analysis"))?;
    let intelligence = Arc::clone(&context.intelligence);
    let request = snapshot.feature_request.clone();
    let (spec, degraded) = supervised(context, phase, move |effort| {
        intelligence.parse_intent(&request, &analysis, effort)
    })?;
    let discovered_files = discover(
        &context.settings.scope,
        &snapshot.codebase_root,
        &spec.affected_files,
    );
    PhaseOutcome::advance(
        phase,
        PhaseDelta {
            discovered_files,
            feature_spec: Some(spec),
            degraded,
            ..PhaseDelta::default()
        },
    )
}

fn structure_validation(
    context: &PhaseContext,
    snapshot: PhaseState,
) -> Result<PhaseOutcome, PhaseFailure> {
    let phase = Phase::StructureValidation;
    let spec = snapshot
        .feature_spec
        .clone()
        .ok_or_else(|| missing(phase, "feature_spec"))?;
    let rules = context.settings.scope.clone();
    let root = snapshot.codebase_root.clone();
    let deadline = deadline_for(&context.settings.deadlines, phase);

    let (violations, degraded) = match run_bounded(phase.as_str(), deadline, move || {
        validate_structure(&spec, &root, &rules, &FsProbe)
    }) {
        Ok(violations) => (violations, false),
        Err(TimeoutSignal::Expired { .. }) => {
            tracing::warn!(phase = %phase, "structure validation timed out, continuing without it");
            (Vec::new(), true)
        }
        Err(lost @ TimeoutSignal::WorkerLost { .. }) => {
            return Err(WorkflowError::Collaborator {
                phase,
                reason: lost.to_string(),
            }
            .into())
        }
    };

    for violation in &violations {
        tracing::info!(
            severity = ?violation.severity,
            kind = %violation.kind,
            "{}",
            violation.message
        );
    }

    let reject = context.settings.limits.high_severity_violations == ViolationPolicy::Fail
        && has_high_severity(&violations);
    let summary = violations
        .iter()
        .filter(|violation| violation.severity == Severity::High)
        .map(|violation| violation.message.clone())
        .collect::<Vec<_>>()
        .join("; ");
    let delta = PhaseDelta {
        violations,
        degraded,
        ..PhaseDelta::default()
    };
    if reject {
        return Err(PhaseFailure {
            error: WorkflowError::StructureRejected { summary },
            partial: delta,
        });
    }
    PhaseOutcome::advance(phase, delta)
}

fn impact_analysis(context: &PhaseContext, snapshot: PhaseState) -> Result<PhaseOutcome, PhaseFailure> {
    let phase = Phase::ImpactAnalysis;
    let spec = snapshot
        .feature_spec
        .clone()
        .ok_or_else(|| missing(phase, "feature_spec"))?;
    let analysis = snapshot
        .context_analysis
        .clone()
        .ok_or_else(|| missing(phase, "context_analysis"))?;
    let intelligence = Arc::clone(&context.intelligence);
    let (impact, degraded) = supervised(context, phase, move |effort| {
        intelligence.analyze_impact(&spec, &analysis, effort)
    })?;
    let discovered_files = discover(&context.settings.scope, &snapshot.codebase_root, &impact.files);
    PhaseOutcome::advance(
        phase,
        PhaseDelta {
            discovered_files,
            impact_analysis: Some(impact),
            degraded,
            ..PhaseDelta::default()
        },
    )
}

/// Impact files win over the coarser feature-spec list when present.
fn scope_source_files(snapshot: &PhaseState) -> Result<Vec<String>, WorkflowError> {
    match (&snapshot.impact_analysis, &snapshot.feature_spec) {
        (Some(impact), _) if !impact.files.is_empty() => Ok(impact.files.clone()),
        (_, Some(spec)) => Ok(spec.affected_files.clone()),
        (Some(_), None) => Ok(Vec::new()),
        (None, None) => Err(missing(Phase::CodeSynthesis, "impact_analysis")),
    }
}

fn code_synthesis(context: &PhaseContext, snapshot: PhaseState) -> Result<PhaseOutcome, PhaseFailure> {
    let phase = Phase::CodeSynthesis;
    let files = scope_source_files(&snapshot)?;
    let resolver = ScopeResolver::new(context.settings.scope.clone());
    let scope = resolver.resolve(&files, &snapshot.codebase_root, context.settings.scope.expand);
    tracing::info!(
        run_id = %snapshot.run_id,
        exact_files = scope.exact_files.len(),
        expanded_files = scope.expanded_files.len(),
        allowed_dirs = scope.allowed_dirs.len(),
        fallback = scope.fallback_applied,
        "resolved synthesis scope"
    );

    let generator = Arc::clone(&context.generator);
    let proposal_state = snapshot.clone();
    let proposal_scope = scope.clone();
    let proposed = supervised(context, phase, move |effort| {
        generator.propose_tool_calls(&proposal_state, &proposal_scope, effort)
    });
    let (proposals, degraded) = match proposed {
        Ok(value) => value,
        Err(error) => {
            return Err(PhaseFailure {
                error,
                partial: PhaseDelta {
                    proposed_scope: Some(scope),
                    ..PhaseDelta::default()
                },
            })
        }
    };

    let mut run = SynthesisRun {
        context,
        snapshot: &snapshot,
        scope: &scope,
        audit: snapshot.guardrail_log.clone(),
        guarded: Vec::new(),
        errors: Vec::new(),
        retries: 0,
    };
    let result = run.process(proposals);
    let SynthesisRun {
        audit,
        guarded,
        errors,
        retries,
        ..
    } = run;
    let delta = PhaseDelta {
        proposed_scope: Some(scope),
        tool_calls: guarded,
        errors,
        degraded,
        tool_call_retries: Some(retries),
        guardrail_log: Some(audit),
        ..PhaseDelta::default()
    };
    match result {
        Ok(()) => PhaseOutcome::advance(phase, delta),
        Err(error) => Err(PhaseFailure {
            error,
            partial: delta,
        }),
    }
}

struct SynthesisRun<'a> {
    context: &'a PhaseContext,
    snapshot: &'a PhaseState,
    scope: &'a ScopeSet,
    audit: GuardrailAuditLog,
    guarded: Vec<GuardedToolCall>,
    errors: Vec<ErrorRecord>,
    retries: u32,
}

impl SynthesisRun<'_> {
    fn process(&mut self, proposals: Vec<ProposedToolCall>) -> Result<(), WorkflowError> {
        let max_retries = self.context.settings.limits.max_tool_call_retries;
        let mut queue: VecDeque<ProposedToolCall> = proposals.into();
        while let Some(proposal) = queue.pop_front() {
            let call = match self.validate(proposal) {
                Ok(call) => call,
                Err(error) => {
                    tracing::warn!(error = %error, "dropping invalid tool call");
                    self.errors
                        .push(ErrorRecord::from_error(Phase::CodeSynthesis, &error));
                    continue;
                }
            };

            let Some(refusal) = self.guard(call)? else {
                continue;
            };
            let Some(revised) = self.context.generator.revise_after_refusal(&refusal) else {
                continue;
            };
            self.retries += 1;
            if self.retries > max_retries {
                return Err(WorkflowError::RetryLimitExceeded {
                    max_retries,
                    last_refusal: refusal.to_string(),
                });
            }
            queue.push_front(revised);
        }
        Ok(())
    }

    fn validate(&self, proposal: ProposedToolCall) -> Result<ToolCall, WorkflowError> {
        let name =
            ToolName::parse(&proposal.tool).map_err(|reason| WorkflowError::Validation { reason })?;
        let call = ToolCall::from_args(name, proposal.args, &self.snapshot.codebase_root);
        let Some(path) = call.display_path() else {
            // A pathless list targets the codebase root; nothing else can run without one.
            if name == ToolName::List {
                return Ok(call);
            }
            return Err(WorkflowError::ExtractionFailure {
                tool: name.to_string(),
            });
        };
        if name.is_introspective() {
            return Ok(call);
        }
        let required: &[&str] = match name {
            ToolName::Write => &["content"],
            ToolName::Edit => &["old_string", "new_string"],
            ToolName::Read | ToolName::List => &[],
        };
        for key in required {
            let empty = call.arg(key).map(str::is_empty).unwrap_or(true);
            let allowed_empty = *key == "new_string" && call.arg(key).is_some();
            if empty && !allowed_empty {
                return Err(WorkflowError::Validation {
                    reason: format!("`{name}` call to `{path}` has empty `{key}`"),
                });
            }
        }
        Ok(call)
    }

    /// Records the call and returns the refusal when it was stopped.
    fn guard(&mut self, mut call: ToolCall) -> Result<Option<GuardrailRefusal>, WorkflowError> {
        let context = self.context;
        let decision = match context.guardrail {
            None => None,
            Some(guardrail) => match guardrail.check(&call, self.scope, &mut self.audit) {
                Ok(decision) => Some(decision),
                Err(refusal) => {
                    if let Some(target) = self.near_miss_target(&call, &refusal) {
                        tracing::info!(
                            tool = %call.name,
                            from = call.display_path().as_deref().unwrap_or(""),
                            to = %target.display(),
                            "pointing near-miss path at requested file"
                        );
                        call.retarget(target);
                        return self.guard(call);
                    }
                    self.refuse(call, refusal.as_decision(), &refusal)?;
                    return Ok(Some(refusal));
                }
            },
        };

        for hook in &context.before_tool_call {
            if let HookVerdict::Veto(reason) = hook.before_tool_call(&call, self.snapshot) {
                let refusal = GuardrailRefusal::vetoed(&call, hook.name(), &reason, self.scope);
                self.refuse(call, decision, &refusal)?;
                return Ok(Some(refusal));
            }
        }

        self.guarded.push(GuardedToolCall {
            call,
            decision,
            forwarded: true,
            refusal: None,
            superseded: false,
        });
        Ok(None)
    }

    /// A suffix refusal is followed only for tools that act on an existing file,
    /// and only when the literal path does not exist.
    fn near_miss_target(&self, call: &ToolCall, refusal: &GuardrailRefusal) -> Option<PathBuf> {
        if refusal.matched_rule != Some(MatchedRule::SuffixMatch) || call.name == ToolName::Write {
            return None;
        }
        let resolved = call.resolved_path.as_deref()?;
        if FsProbe.exists(resolved) {
            return None;
        }
        refusal.suggested_target.clone()
    }

    fn refuse(
        &mut self,
        call: ToolCall,
        decision: Option<GuardrailDecision>,
        refusal: &GuardrailRefusal,
    ) -> Result<(), WorkflowError> {
        tracing::warn!(
            run_id = %self.snapshot.run_id,
            tool = %refusal.tool,
            path = refusal.path.as_deref().unwrap_or(""),
            "{}",
            refusal.reason
        );
        if let Some(state_root) = &self.context.state_root {
            let line = format!(
                "ts={} run_id={} tool={} path={} rule={} reason=\"{}\"",
                chrono::Utc::now().timestamp(),
                self.snapshot.run_id,
                refusal.tool,
                refusal.path.as_deref().unwrap_or("-"),
                refusal
                    .matched_rule
                    .map(|rule| rule.as_str())
                    .unwrap_or("hook_veto"),
                refusal.reason
            );
            append_security_log_line(state_root, &line)
                .map_err(|source| io_error(&security_log_path(state_root), source))?;
        }
        let violation = WorkflowError::ScopeViolation {
            refusal: Box::new(refusal.clone()),
        };
        self.errors
            .push(ErrorRecord::from_error(Phase::CodeSynthesis, &violation));
        self.guarded.push(GuardedToolCall {
            call,
            decision,
            forwarded: false,
            refusal: Some(refusal.to_string()),
            superseded: false,
        });
        Ok(())
    }
}

/// Runs forwarded calls one at a time against the phase deadline. Each result
/// is kept as soon as it arrives, so a timeout still leaves an accurate record.
fn execution(context: &PhaseContext, snapshot: PhaseState) -> Result<PhaseOutcome, PhaseFailure> {
    let phase = Phase::Execution;
    let calls: Vec<ToolCall> = snapshot
        .forwarded_calls()
        .map(|guarded| guarded.call.clone())
        .collect();
    if calls.is_empty() {
        tracing::info!(run_id = %snapshot.run_id, "no approved tool calls to execute");
        return PhaseOutcome::advance(phase, PhaseDelta::default());
    }

    let deadline = deadline_for(&context.settings.deadlines, phase);
    let started = Instant::now();
    let mut patches = Vec::with_capacity(calls.len());
    for (index, call) in calls.iter().enumerate() {
        let remaining = deadline.saturating_sub(started.elapsed());
        let timed_out = || WorkflowError::TimeoutDegraded {
            phase,
            deadline_ms: deadline.as_millis(),
        };
        if remaining.is_zero() {
            tracing::warn!(
                run_id = %snapshot.run_id,
                skipped = calls.len() - index,
                "execution deadline reached before all approved calls started"
            );
            return Err(PhaseFailure {
                error: timed_out(),
                partial: PhaseDelta {
                    patches_applied: patches,
                    ..PhaseDelta::default()
                },
            });
        }

        let executor = Arc::clone(&context.executor);
        let pending = call.clone();
        let error = match run_bounded(phase.as_str(), remaining, move || executor.execute(&pending)) {
            Ok(patch) => {
                if !patch.success {
                    tracing::warn!(
                        tool = %patch.tool,
                        path = patch.path.as_deref().unwrap_or(""),
                        "{}",
                        patch.message
                    );
                }
                patches.push(patch);
                continue;
            }
            Err(TimeoutSignal::Expired { .. }) => timed_out(),
            Err(lost @ TimeoutSignal::WorkerLost { .. }) => WorkflowError::Collaborator {
                phase,
                reason: lost.to_string(),
            },
        };
        patches.push(PatchResult {
            tool: call.name,
            path: call.display_path(),
            success: false,
            message: format!("outcome unknown: {error}"),
        });
        return Err(PhaseFailure {
            error,
            partial: PhaseDelta {
                patches_applied: patches,
                ..PhaseDelta::default()
            },
        });
    }

    PhaseOutcome::advance(
        phase,
        PhaseDelta {
            patches_applied: patches,
            ..PhaseDelta::default()
        },
    )
}
