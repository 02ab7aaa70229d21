//! Interfaces to the services the workflow drives but does not implement:
//! code understanding, code generation and tool execution.

use crate::guardrail::{GuardrailRefusal, ToolCall, ToolName};
use crate::orchestration::state::PhaseState;
use crate::scope::ScopeSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// How much work a collaborator should spend. `Reduced` is used after a timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effort {
    Full,
    Reduced,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextAnalysis {
    pub summary: String,
    #[serde(default)]
    pub files: Vec<String>,
    /// Never persisted.
    #[serde(skip)]
    pub file_contents: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub intent_summary: String,
    #[serde(default)]
    pub affected_files: Vec<String>,
    #[serde(default)]
    pub tasks: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpactAnalysis {
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
}

/// A tool call as the generator emits it, before any validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedToolCall {
    pub tool: String,
    #[serde(default)]
    pub args: BTreeMap<String, String>,
}

impl ProposedToolCall {
    pub fn new<I, K, V>(tool: &str, args: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            tool: tool.to_string(),
            args: args
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchResult {
    pub tool: ToolName,
    pub path: Option<String>,
    pub success: bool,
    pub message: String,
}

pub trait CodeIntelligence: Send + Sync {
    fn analyze_context(
        &self,
        codebase_root: &Path,
        feature_request: &str,
        effort: Effort,
    ) -> Result<ContextAnalysis, String>;

    fn parse_intent(
        &self,
        feature_request: &str,
        context: &ContextAnalysis,
        effort: Effort,
    ) -> Result<FeatureSpec, String>;

    fn analyze_impact(
        &self,
        spec: &FeatureSpec,
        context: &ContextAnalysis,
        effort: Effort,
    ) -> Result<ImpactAnalysis, String>;
}

pub trait CodeGenerator: Send + Sync {
    fn propose_tool_calls(
        &self,
        state: &PhaseState,
        scope: &ScopeSet,
        effort: Effort,
    ) -> Result<Vec<ProposedToolCall>, String>;

    /// Offered every hard refusal; `None` abandons the refused call.
    fn revise_after_refusal(&self, refusal: &GuardrailRefusal) -> Option<ProposedToolCall>;
}

/// Performs calls the guardrail has already approved.
pub trait ToolExecutor: Send + Sync {
    fn execute(&self, call: &ToolCall) -> PatchResult;
}
