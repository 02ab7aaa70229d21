use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    ContextAnalysis,
    IntentParsing,
    StructureValidation,
    ImpactAnalysis,
    CodeSynthesis,
    Execution,
    ErrorHandling,
    Done,
}

impl Phase {
    pub const INITIAL: Phase = Phase::ContextAnalysis;

    /// The only non-error phase this one may hand over to.
    pub fn successor(self) -> Option<Self> {
        match self {
            Phase::ContextAnalysis => Some(Phase::IntentParsing),
            Phase::IntentParsing => Some(Phase::StructureValidation),
            Phase::StructureValidation => Some(Phase::ImpactAnalysis),
            Phase::ImpactAnalysis => Some(Phase::CodeSynthesis),
            Phase::CodeSynthesis => Some(Phase::Execution),
            Phase::Execution => Some(Phase::Done),
            Phase::ErrorHandling | Phase::Done => None,
        }
    }

    /// Work phases move to their successor or to `ErrorHandling`.
    /// `ErrorHandling` may re-enter a work phase when recovery is enabled.
    pub fn can_transition_to(self, next: Self) -> bool {
        match self {
            Phase::Done => false,
            Phase::ErrorHandling => next.is_work_phase(),
            _ => Some(next) == self.successor() || next == Phase::ErrorHandling,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Done | Phase::ErrorHandling)
    }

    pub fn is_work_phase(self) -> bool {
        !self.is_terminal()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::ContextAnalysis => "context_analysis",
            Phase::IntentParsing => "intent_parsing",
            Phase::StructureValidation => "structure_validation",
            Phase::ImpactAnalysis => "impact_analysis",
            Phase::CodeSynthesis => "code_synthesis",
            Phase::Execution => "execution",
            Phase::ErrorHandling => "error_handling",
            Phase::Done => "done",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
