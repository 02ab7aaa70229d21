pub mod collaborators;
pub mod error;
pub mod error_handling;
pub mod executor;
pub mod hooks;
pub mod phase;
pub mod phases;
pub mod run_store;
pub mod scripted;
pub mod state;
pub mod structure;
pub mod supervisor;
pub mod workflow_engine;

pub use collaborators::{
    CodeGenerator, CodeIntelligence, ContextAnalysis, Effort, FeatureSpec, ImpactAnalysis,
    PatchResult, ProposedToolCall, ToolExecutor,
};
pub use error::WorkflowError;
pub use error_handling::{ErrorHandler, Recovery};
pub use executor::{DryRunExecutor, FsToolExecutor};
pub use hooks::{AfterModelCall, BeforeToolCall, HookVerdict, TracingHook};
pub use phase::Phase;
pub use phases::{deadline_for, PhaseContext, PhaseFailure, PhaseOutcome};
pub use run_store::{RunRecord, RunStatus, RunStore};
pub use scripted::{FeatureRequestSpec, ReplayGenerator, ReplayIntelligence};
pub use state::{ErrorRecord, GuardedToolCall, PhaseDelta, PhaseState, TransitionRecord};
pub use structure::{has_high_severity, validate_structure, Severity, Violation};
pub use supervisor::{run_bounded, TimeoutSignal};
pub use workflow_engine::{CancellationFlag, WorkflowOutcome, WorkflowScheduler};
