use crate::config::ScopeSettings;
use crate::orchestration::collaborators::FeatureSpec;
use crate::scope::{normalize, PathProbe};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub severity: Severity,
    pub kind: String,
    pub message: String,
}

impl Violation {
    fn new(severity: Severity, kind: &str, message: String) -> Self {
        Self {
            severity,
            kind: kind.to_string(),
            message,
        }
    }
}

/// Sanity checks on a parsed feature spec before impact analysis relies on it.
pub fn validate_structure<P: PathProbe>(
    spec: &FeatureSpec,
    codebase_root: &Path,
    rules: &ScopeSettings,
    probe: &P,
) -> Vec<Violation> {
    let mut violations = Vec::new();

    if spec.intent_summary.trim().is_empty() {
        violations.push(Violation::new(
            Severity::Medium,
            "empty_intent",
            "feature spec has no intent summary".to_string(),
        ));
    }
    if spec.tasks.iter().all(|task| task.trim().is_empty()) {
        violations.push(Violation::new(
            Severity::Low,
            "no_tasks",
            "feature spec lists no tasks".to_string(),
        ));
    }

    let mut usable = 0usize;
    let mut seen = BTreeSet::new();
    for raw in &spec.affected_files {
        if rules.is_sentinel(raw) {
            violations.push(Violation::new(
                Severity::Low,
                "placeholder_entry",
                format!("affected file entry `{}` is a placeholder", raw.trim()),
            ));
            continue;
        }
        usable += 1;
        let path = normalize(codebase_root, raw);
        if !seen.insert(path.clone()) {
            violations.push(Violation::new(
                Severity::Low,
                "duplicate_entry",
                format!("`{}` is listed more than once", path.display()),
            ));
            continue;
        }
        if !path.starts_with(codebase_root) {
            violations.push(Violation::new(
                Severity::High,
                "outside_codebase_root",
                format!(
                    "`{}` lies outside the codebase root {}",
                    path.display(),
                    codebase_root.display()
                ),
            ));
            continue;
        }
        if probe.is_dir(&path) {
            violations.push(Violation::new(
                Severity::Medium,
                "directory_entry",
                format!("`{}` is a directory, expected a file", path.display()),
            ));
            continue;
        }
        let parent_exists = path.parent().map(|p| probe.is_dir(p)).unwrap_or(false);
        if !probe.exists(&path) && !parent_exists {
            violations.push(Violation::new(
                Severity::Low,
                "missing_parent_directory",
                format!(
                    "`{}` would be created in a directory that does not exist yet",
                    path.display()
                ),
            ));
        }
    }

    if usable == 0 {
        violations.push(Violation::new(
            Severity::Medium,
            "no_affected_files",
            "feature spec names no affected files; scope will fall back".to_string(),
        ));
    }

    violations
}

pub fn has_high_severity(violations: &[Violation]) -> bool {
    violations
        .iter()
        .any(|violation| violation.severity == Severity::High)
}
