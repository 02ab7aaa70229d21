use phasegate::config::{EnforcementMode, ScopeSettings};
use phasegate::guardrail::{
    decide, GuardrailAuditLog, MatchedRule, ToolCall, ToolCallGuardrail, ToolName, Verdict,
};
use phasegate::scope::{PathComparison, ScopeResolver, ScopeSet, StaticProbe};
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

fn call(name: ToolName, path: &str) -> ToolCall {
    let args = BTreeMap::from([
        ("path".to_string(), path.to_string()),
        ("content".to_string(), "x".to_string()),
    ]);
    ToolCall::from_args(name, args, Path::new("/proj"))
}

fn controller_scope() -> ScopeSet {
    let probe = StaticProbe::with_files([
        "/proj/src/UserController.java",
        "/proj/src/UserService.java",
    ]);
    ScopeResolver::with_probe(ScopeSettings::default(), probe).resolve(
        &["src/UserController.java".to_string()],
        Path::new("/proj"),
        true,
    )
}

#[test]
fn guardrail_module_allows_sibling_of_requested_file() {
    let scope = controller_scope();
    let decision = decide(
        &call(ToolName::Write, "src/UserService.java"),
        &scope,
        EnforcementMode::Hard,
    );
    assert_eq!(decision.verdict, Verdict::Allow);
    assert_eq!(decision.matched_rule, MatchedRule::SiblingMatch);
}

#[test]
fn guardrail_module_blocks_out_of_scope_write_in_hard_mode() {
    let scope = controller_scope();
    let decision = decide(
        &call(ToolName::Write, "tmp/evil.java"),
        &scope,
        EnforcementMode::Hard,
    );
    assert_eq!(decision.verdict, Verdict::Block);
    assert_eq!(decision.matched_rule, MatchedRule::Fallback);
}

#[test]
fn guardrail_module_warns_on_out_of_scope_write_in_soft_mode() {
    let scope = controller_scope();
    let guardrail = ToolCallGuardrail::new(EnforcementMode::Soft, PathComparison::CaseSensitive);
    let mut audit = GuardrailAuditLog::default();

    let decision = guardrail
        .check(&call(ToolName::Write, "tmp/evil.java"), &scope, &mut audit)
        .expect("soft mode forwards the call");
    assert_eq!(decision.verdict, Verdict::WarnAllow);
    assert_eq!(decision.matched_rule, MatchedRule::Fallback);

    let warnings: Vec<_> = audit.warnings().collect();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].matched_rule, MatchedRule::Fallback);
    assert_eq!(warnings[0].path.as_deref(), Some("/proj/tmp/evil.java"));
}

#[test]
fn guardrail_module_blocks_write_without_path() {
    let scope = controller_scope();
    let empty = ToolCall::from_args(ToolName::Write, BTreeMap::new(), Path::new("/proj"));
    assert!(empty.resolved_path.is_none());

    let guardrail = ToolCallGuardrail::default();
    let mut audit = GuardrailAuditLog::default();
    let refusal = guardrail
        .check(&empty, &scope, &mut audit)
        .expect_err("empty path must be refused");
    assert_eq!(refusal.matched_rule, Some(MatchedRule::ExtractionFailure));
    assert_eq!(refusal.reason, "cannot validate empty path");
    assert_eq!(audit.blocks().count(), 1);
}

#[test]
fn guardrail_module_refusal_names_path_and_scope() {
    let scope = controller_scope();
    let mut audit = GuardrailAuditLog::default();
    let refusal = ToolCallGuardrail::default()
        .check(&call(ToolName::Edit, "/etc/hosts"), &scope, &mut audit)
        .expect_err("outside root");
    let text = refusal.to_string();
    assert!(text.contains("/etc/hosts"));
    assert!(text.contains("/proj/src/UserController.java"));
}

#[test]
fn guardrail_module_read_without_path_is_allowed() {
    let scope = controller_scope();
    let list = ToolCall::from_args(ToolName::List, BTreeMap::new(), Path::new("/proj"));
    let decision = decide(&list, &scope, EnforcementMode::Hard);
    assert_eq!(decision.verdict, Verdict::Allow);
    assert_eq!(decision.matched_rule, MatchedRule::ExtractionFailure);
}

fn file_name() -> impl Strategy<Value = String> {
    "[a-d]{1,3}\\.(rs|py)"
}

fn segment() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("src".to_string()),
        Just("lib".to_string()),
        Just("models".to_string()),
        "[a-d]{1,3}".prop_map(|s| s),
    ]
}

/// Relative paths of one to four segments, biased toward names the scope uses.
fn relative_path() -> impl Strategy<Value = String> {
    (prop::collection::vec(segment(), 0..3), file_name()).prop_map(|(dirs, file)| {
        let mut parts = dirs;
        parts.push(file);
        parts.join("/")
    })
}

fn scope_of(files: &[String]) -> ScopeSet {
    ScopeSet {
        exact_files: files
            .iter()
            .map(|name| PathBuf::from(format!("/proj/src/lib/{name}")))
            .collect(),
        allowed_dirs: BTreeSet::from([PathBuf::from("/proj/src/models")]),
        ..ScopeSet::default()
    }
}

fn admitted_by_scope(path: &Path, scope: &ScopeSet) -> bool {
    let inside_dir = scope
        .allowed_dirs
        .iter()
        .any(|dir| path.starts_with(dir) && path != dir.as_path());
    let beside_exact = scope
        .exact_files
        .iter()
        .any(|file| file.parent() == path.parent());
    scope.exact_files.contains(path) || inside_dir || beside_exact
}

proptest! {
    #[test]
    fn guardrail_module_hard_mode_blocks_everything_outside_scope(
        files in prop::collection::vec(file_name(), 1..4),
        raw in relative_path(),
    ) {
        let scope = scope_of(&files);
        let write = call(ToolName::Write, &raw);
        let resolved = write.resolved_path.clone().expect("generated path resolves");
        prop_assume!(!admitted_by_scope(&resolved, &scope));

        for name in [ToolName::Write, ToolName::Edit, ToolName::Read] {
            let decision = decide(&call(name, &raw), &scope, EnforcementMode::Hard);
            prop_assert_eq!(decision.verdict, Verdict::Block, "{} {}", name, raw);
        }
    }

    #[test]
    fn guardrail_module_near_miss_of_requested_file_is_blocked(
        files in prop::collection::btree_set(file_name(), 1..4),
    ) {
        let files: Vec<String> = files.into_iter().collect();
        let scope = scope_of(&files);
        for name in &files {
            let decision = decide(
                &call(ToolName::Write, &format!("lib/{name}")),
                &scope,
                EnforcementMode::Hard,
            );
            prop_assert_eq!(decision.verdict, Verdict::Block);
            prop_assert_eq!(decision.matched_rule, MatchedRule::SuffixMatch);
            prop_assert_eq!(
                decision.target,
                Some(PathBuf::from(format!("/proj/src/lib/{name}")))
            );
        }
    }

    #[test]
    fn guardrail_module_every_exact_file_is_allowed(
        files in prop::collection::btree_set(file_name(), 1..5),
    ) {
        let files: Vec<String> = files.into_iter().collect();
        let scope = scope_of(&files);
        let exact: BTreeSet<PathBuf> = scope.exact_files.clone();
        for path in exact {
            let decision = decide(
                &call(ToolName::Write, &path.to_string_lossy()),
                &scope,
                EnforcementMode::Hard,
            );
            prop_assert_eq!(decision.verdict, Verdict::Allow);
            prop_assert_eq!(decision.matched_rule, MatchedRule::ExactMatch);
        }
    }
}
