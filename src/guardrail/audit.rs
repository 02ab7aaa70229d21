use super::decision::{GuardrailDecision, MatchedRule, Verdict};
use super::tool_call::{ToolCall, ToolName};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AuditEntry {
    pub sequence: u64,
    /// RFC 3339, UTC.
    pub at: String,
    pub tool: ToolName,
    pub path: Option<String>,
    pub verdict: Verdict,
    pub matched_rule: MatchedRule,
    pub reason: String,
}

/// Ordered record of every guardrail decision in one workflow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct GuardrailAuditLog {
    entries: Vec<AuditEntry>,
}

impl GuardrailAuditLog {
    pub fn record(&mut self, call: &ToolCall, decision: &GuardrailDecision) -> &AuditEntry {
        let sequence = self.entries.len() as u64 + 1;
        self.entries.push(AuditEntry {
            sequence,
            at: chrono::Utc::now().to_rfc3339(),
            tool: call.name,
            path: call.display_path(),
            verdict: decision.verdict,
            matched_rule: decision.matched_rule,
            reason: decision.reason.clone(),
        });
        &self.entries[self.entries.len() - 1]
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Calls that went through only because soft mode downgraded a block.
    pub fn warnings(&self) -> impl Iterator<Item = &AuditEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.verdict == Verdict::WarnAllow)
    }

    pub fn blocks(&self) -> impl Iterator<Item = &AuditEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.verdict == Verdict::Block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnforcementMode;
    use crate::guardrail::decide;
    use crate::scope::ScopeSet;
    use std::collections::BTreeMap;
    use std::path::Path;

    #[test]
    fn entries_are_sequenced_in_decision_order() {
        let scope = ScopeSet::default();
        let mut log = GuardrailAuditLog::default();
        for raw in ["a.rs", "b.rs"] {
            let call = ToolCall::from_args(
                ToolName::Write,
                BTreeMap::from([("path".to_string(), raw.to_string())]),
                Path::new("/proj"),
            );
            let decision = decide(&call, &scope, EnforcementMode::Soft);
            log.record(&call, &decision);
        }
        let sequences: Vec<u64> = log.entries().iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![1, 2]);
        assert_eq!(log.blocks().count(), 2);
        assert_eq!(log.warnings().count(), 0);
        assert!(chrono::DateTime::parse_from_rfc3339(&log.entries()[0].at).is_ok());
    }

    #[test]
    fn log_serializes_as_plain_list() {
        let log = GuardrailAuditLog::default();
        assert_eq!(serde_json::to_string(&log).expect("encode"), "[]");
    }
}
