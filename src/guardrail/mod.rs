pub mod audit;
pub mod decision;
pub mod tool_call;

pub use audit::{AuditEntry, GuardrailAuditLog};
pub use decision::{
    decide, GuardrailDecision, GuardrailRefusal, MatchedRule, ToolCallGuardrail, Verdict,
};
pub use tool_call::{ToolCall, ToolName, PATH_ARG_KEYS};
