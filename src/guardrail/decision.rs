use super::audit::GuardrailAuditLog;
use super::tool_call::{ToolCall, ToolName};
use crate::config::EnforcementMode;
use crate::scope::{lexical_normalize, PathComparison, ScopeSet};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Allow,
    Block,
    WarnAllow,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Block => "block",
            Self::WarnAllow => "warn_allow",
        }
    }

    pub fn permits(self) -> bool {
        !matches!(self, Self::Block)
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchedRule {
    ExactMatch,
    SuffixMatch,
    SiblingMatch,
    DirectoryContainment,
    Fallback,
    ExtractionFailure,
}

impl MatchedRule {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ExactMatch => "exact_match",
            Self::SuffixMatch => "suffix_match",
            Self::SiblingMatch => "sibling_match",
            Self::DirectoryContainment => "directory_containment",
            Self::Fallback => "fallback",
            Self::ExtractionFailure => "extraction_failure",
        }
    }
}

impl std::fmt::Display for MatchedRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct GuardrailDecision {
    pub verdict: Verdict,
    pub reason: String,
    pub matched_rule: MatchedRule,
    /// Scope file a blocked relative path most likely meant. Only a suggestion:
    /// the decision itself never admits it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<PathBuf>,
}

impl GuardrailDecision {
    fn new(verdict: Verdict, matched_rule: MatchedRule, reason: impl Into<String>) -> Self {
        Self {
            verdict,
            reason: reason.into(),
            matched_rule,
            target: None,
        }
    }
}

/// Structured explanation returned to the code generator when a call is stopped.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct GuardrailRefusal {
    pub tool: ToolName,
    pub path: Option<String>,
    /// `None` when a middleware hook vetoed the call rather than a scope rule.
    pub matched_rule: Option<MatchedRule>,
    pub reason: String,
    pub allowed_scope: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_target: Option<PathBuf>,
}

impl GuardrailRefusal {
    pub fn from_decision(call: &ToolCall, decision: &GuardrailDecision, scope: &ScopeSet) -> Self {
        Self {
            tool: call.name,
            path: call.display_path(),
            matched_rule: Some(decision.matched_rule),
            reason: decision.reason.clone(),
            allowed_scope: scope.describe(),
            suggested_target: decision.target.clone(),
        }
    }

    pub fn vetoed(call: &ToolCall, hook: &str, reason: &str, scope: &ScopeSet) -> Self {
        Self {
            tool: call.name,
            path: call.display_path(),
            matched_rule: None,
            reason: format!("vetoed by hook `{hook}`: {reason}"),
            allowed_scope: scope.describe(),
            suggested_target: None,
        }
    }

    /// The blocking decision behind a rule-based refusal.
    pub fn as_decision(&self) -> Option<GuardrailDecision> {
        self.matched_rule.map(|rule| {
            let mut decision = GuardrailDecision::new(Verdict::Block, rule, self.reason.clone());
            decision.target = self.suggested_target.clone();
            decision
        })
    }
}

impl std::fmt::Display for GuardrailRefusal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let path = self.path.as_deref().unwrap_or("<no path>");
        match self.matched_rule {
            Some(rule) => write!(
                f,
                "guardrail refused `{}` on `{path}` (rule {rule}): {}; allowed scope: {}",
                self.tool, self.reason, self.allowed_scope
            ),
            None => write!(
                f,
                "guardrail refused `{}` on `{path}`: {}; allowed scope: {}",
                self.tool, self.reason, self.allowed_scope
            ),
        }
    }
}

impl std::error::Error for GuardrailRefusal {}

/// Decides tool calls against a [`ScopeSet`]. Pure: never touches the disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ToolCallGuardrail {
    pub mode: EnforcementMode,
    pub comparison: PathComparison,
}

impl ToolCallGuardrail {
    pub fn new(mode: EnforcementMode, comparison: PathComparison) -> Self {
        Self { mode, comparison }
    }

    pub fn decide(&self, call: &ToolCall, scope: &ScopeSet) -> GuardrailDecision {
        let Some(path) = call.resolved_path.as_deref() else {
            return if call.name.is_introspective() {
                GuardrailDecision::new(
                    Verdict::Allow,
                    MatchedRule::ExtractionFailure,
                    "no path argument; introspective tool allowed",
                )
            } else {
                GuardrailDecision::new(
                    Verdict::Block,
                    MatchedRule::ExtractionFailure,
                    "cannot validate empty path",
                )
            };
        };

        if scope.is_empty() && !call.name.is_introspective() {
            return GuardrailDecision::new(
                Verdict::Block,
                MatchedRule::Fallback,
                "allowed scope is empty",
            );
        }

        if scope
            .exact_files
            .iter()
            .any(|file| self.comparison.same(file, path))
        {
            return GuardrailDecision::new(
                Verdict::Allow,
                MatchedRule::ExactMatch,
                "path is a requested file",
            );
        }

        if let Some(dir) = scope
            .allowed_dirs
            .iter()
            .find(|dir| self.comparison.is_within(path, dir))
        {
            return GuardrailDecision::new(
                Verdict::Allow,
                MatchedRule::DirectoryContainment,
                format!("path is inside allowed directory {}", dir.display()),
            );
        }

        let expanded = scope
            .expanded_files
            .iter()
            .any(|file| self.comparison.same(file, path));
        let beside_exact = scope
            .exact_files
            .iter()
            .filter(|file| !scope.out_of_root.contains(*file))
            .any(|file| self.comparison.is_sibling(file, path));
        if expanded || beside_exact {
            return GuardrailDecision::new(
                Verdict::Allow,
                MatchedRule::SiblingMatch,
                "path is beside a requested file",
            );
        }

        let verdict = match self.mode {
            EnforcementMode::Hard => Verdict::Block,
            EnforcementMode::Soft => Verdict::WarnAllow,
        };
        let soft_note = match verdict {
            Verdict::WarnAllow => "; allowed in soft mode",
            _ => "",
        };

        // A near miss: the relative path names a requested file from a deeper
        // directory. The resolved path is still outside the scope.
        if let Some(target) = call
            .raw_path
            .as_deref()
            .and_then(|raw| self.unique_suffix_match(raw, scope))
        {
            let mut decision = GuardrailDecision::new(
                verdict,
                MatchedRule::SuffixMatch,
                format!(
                    "path is outside the allowed scope; did you mean {}{soft_note}",
                    target.display()
                ),
            );
            decision.target = Some(target);
            return decision;
        }

        GuardrailDecision::new(
            verdict,
            MatchedRule::Fallback,
            format!("path is outside the allowed scope{soft_note}"),
        )
    }

    /// Decides, records the decision, and turns a block into a refusal.
    pub fn check(
        &self,
        call: &ToolCall,
        scope: &ScopeSet,
        audit: &mut GuardrailAuditLog,
    ) -> Result<GuardrailDecision, GuardrailRefusal> {
        let decision = self.decide(call, scope);
        audit.record(call, &decision);
        match decision.verdict {
            Verdict::Allow => Ok(decision),
            Verdict::WarnAllow => {
                tracing::warn!(
                    tool = %call.name,
                    path = call.display_path().as_deref().unwrap_or(""),
                    rule = %decision.matched_rule,
                    "guardrail allowed out-of-scope call in soft mode"
                );
                Ok(decision)
            }
            Verdict::Block => Err(GuardrailRefusal::from_decision(call, &decision, scope)),
        }
    }

    fn unique_suffix_match(&self, raw: &str, scope: &ScopeSet) -> Option<PathBuf> {
        let cleaned = raw.trim().replace('\\', "/");
        let relative = Path::new(&cleaned);
        if relative.is_absolute() {
            return None;
        }
        let suffix = self.comparison.fold(&lexical_normalize(relative));
        let bounded = suffix.components().count() > 0
            && suffix
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !bounded {
            return None;
        }

        let mut matches = scope
            .exact_files
            .iter()
            .filter(|file| self.comparison.fold(file).ends_with(&suffix));
        let first = matches.next()?;
        if matches.next().is_some() {
            return None;
        }
        Some(first.clone())
    }
}

/// Case-sensitive decision with the given mode.
pub fn decide(call: &ToolCall, scope: &ScopeSet, mode: EnforcementMode) -> GuardrailDecision {
    ToolCallGuardrail::new(mode, PathComparison::CaseSensitive).decide(call, scope)
}
