use super::paths::{normalize, FsProbe, PathComparison, PathProbe};
use crate::config::ScopeSettings;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Files and directories a guarded tool call may target.
///
/// Siblings picked up by expansion live in `expanded_files`, not in
/// `exact_files`; a file is in scope when it is in either set. Callers that
/// want the whole file list should read both, as [`ScopeSet::covers`] does.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeSet {
    /// Requested files, absolute and normalized, whether or not they exist yet.
    pub exact_files: BTreeSet<PathBuf>,
    /// Source files next to an existing requested file.
    pub expanded_files: BTreeSet<PathBuf>,
    /// Existing directories whose whole subtree is allowed.
    pub allowed_dirs: BTreeSet<PathBuf>,
    /// Subset of `exact_files` that lies outside the codebase root.
    pub out_of_root: BTreeSet<PathBuf>,
    pub fallback_applied: bool,
}

impl ScopeSet {
    pub fn is_empty(&self) -> bool {
        self.exact_files.is_empty() && self.expanded_files.is_empty() && self.allowed_dirs.is_empty()
    }

    /// Whether `path` is reachable through any rule other than sibling directories.
    pub fn covers(&self, path: &Path, comparison: PathComparison) -> bool {
        self.exact_files
            .iter()
            .chain(self.expanded_files.iter())
            .any(|file| comparison.same(file, path))
            || self
                .allowed_dirs
                .iter()
                .any(|dir| comparison.is_within(path, dir))
    }

    /// Human-readable listing used in refusals and fatal error output.
    pub fn describe(&self) -> String {
        if self.is_empty() {
            return "(empty scope)".to_string();
        }
        let mut lines = Vec::new();
        if !self.exact_files.is_empty() {
            lines.push(format!("files: {}", join_paths(&self.exact_files)));
        }
        if !self.expanded_files.is_empty() {
            lines.push(format!("sibling files: {}", join_paths(&self.expanded_files)));
        }
        if !self.allowed_dirs.is_empty() {
            lines.push(format!("directories: {}", join_paths(&self.allowed_dirs)));
        }
        lines.join("; ")
    }
}

fn join_paths(paths: &BTreeSet<PathBuf>) -> String {
    paths
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Turns an upstream "affected files" list into a [`ScopeSet`].
#[derive(Debug, Clone)]
pub struct ScopeResolver<P = FsProbe> {
    rules: ScopeSettings,
    probe: P,
}

impl ScopeResolver<FsProbe> {
    pub fn new(rules: ScopeSettings) -> Self {
        Self {
            rules,
            probe: FsProbe,
        }
    }
}

impl<P: PathProbe> ScopeResolver<P> {
    pub fn with_probe(rules: ScopeSettings, probe: P) -> Self {
        Self { rules, probe }
    }

    pub fn rules(&self) -> &ScopeSettings {
        &self.rules
    }

    pub fn resolve(&self, affected_files: &[String], codebase_root: &Path, expand: bool) -> ScopeSet {
        let mut scope = ScopeSet::default();

        for raw in affected_files {
            if self.rules.is_sentinel(raw) {
                tracing::debug!(entry = %raw, "dropping placeholder scope entry");
                continue;
            }
            let path = normalize(codebase_root, raw);
            if !path.starts_with(codebase_root) {
                tracing::warn!(
                    path = %path.display(),
                    root = %codebase_root.display(),
                    "scope entry lies outside the codebase root"
                );
                scope.out_of_root.insert(path.clone());
            }
            scope.exact_files.insert(path);
        }

        if expand {
            self.expand_into(&mut scope);
        }

        if scope.is_empty() {
            let source_dir = codebase_root.join(self.rules.source_dir.trim());
            let fallback = if self.probe.is_dir(&source_dir) {
                source_dir
            } else {
                codebase_root.to_path_buf()
            };
            tracing::info!(dir = %fallback.display(), "no usable scope entries, applying fallback");
            scope.allowed_dirs.insert(fallback);
            scope.fallback_applied = true;
        }

        scope
    }

    fn expand_into(&self, scope: &mut ScopeSet) {
        let anchors: Vec<PathBuf> = scope
            .exact_files
            .iter()
            .filter(|file| !scope.out_of_root.contains(*file))
            .filter(|file| self.probe.exists(file) && !self.probe.is_dir(file))
            .cloned()
            .collect();

        for anchor in anchors {
            let Some(parent) = anchor.parent() else {
                continue;
            };
            for sibling in self.probe.list_files(parent) {
                if sibling != anchor
                    && !scope.exact_files.contains(&sibling)
                    && self.rules.is_source_file(&sibling)
                {
                    scope.expanded_files.insert(sibling);
                }
            }
            let is_layer = parent
                .file_name()
                .and_then(|name| name.to_str())
                .map(|name| self.rules.is_layer_dir(name))
                .unwrap_or(false);
            if is_layer && self.probe.is_dir(parent) {
                scope.allowed_dirs.insert(parent.to_path_buf());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::paths::StaticProbe;

    fn resolver(files: &[&str]) -> ScopeResolver<StaticProbe> {
        ScopeResolver::with_probe(
            ScopeSettings::default(),
            StaticProbe::with_files(files.iter().copied()),
        )
    }

    fn entries(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn sibling_source_files_are_expanded() {
        let resolver = resolver(&[
            "/proj/src/UserController.java",
            "/proj/src/UserService.java",
            "/proj/src/notes.md",
        ]);
        let scope = resolver.resolve(&entries(&["src/UserController.java"]), Path::new("/proj"), true);
        assert!(scope
            .exact_files
            .contains(Path::new("/proj/src/UserController.java")));
        assert_eq!(
            scope.expanded_files,
            BTreeSet::from([PathBuf::from("/proj/src/UserService.java")])
        );
        assert!(scope.allowed_dirs.is_empty());
        assert!(!scope.fallback_applied);
    }

    #[test]
    fn layer_directory_is_allowed_wholesale() {
        let resolver = resolver(&["/proj/app/services/billing.py", "/proj/app/services/tax.py"]);
        let scope = resolver.resolve(&entries(&["app/services/billing.py"]), Path::new("/proj"), true);
        assert!(scope.allowed_dirs.contains(Path::new("/proj/app/services")));
    }

    #[test]
    fn missing_files_are_nameable_but_do_not_expand() {
        let resolver = resolver(&["/proj/src/existing.rs"]);
        let scope = resolver.resolve(&entries(&["src/new_module.rs"]), Path::new("/proj"), true);
        assert!(scope.exact_files.contains(Path::new("/proj/src/new_module.rs")));
        assert!(scope.expanded_files.is_empty());
        assert!(!scope.fallback_applied);
    }

    #[test]
    fn sentinels_never_become_paths() {
        let resolver = resolver(&["/proj/src/lib.rs"]);
        let scope = resolver.resolve(
            &entries(&["TBD", "  ", "<path>", "N/A"]),
            Path::new("/proj"),
            true,
        );
        assert!(scope.exact_files.is_empty());
        assert!(scope.fallback_applied);
        assert_eq!(
            scope.allowed_dirs,
            BTreeSet::from([PathBuf::from("/proj/src")])
        );
    }

    #[test]
    fn fallback_uses_root_without_source_dir() {
        let resolver = resolver(&["/proj/main.go"]);
        let scope = resolver.resolve(&[], Path::new("/proj"), false);
        assert_eq!(scope.allowed_dirs, BTreeSet::from([PathBuf::from("/proj")]));
    }

    #[test]
    fn out_of_root_entries_are_flagged_and_not_expanded() {
        let resolver = resolver(&["/opt/shared/lib.py", "/opt/shared/other.py"]);
        let scope = resolver.resolve(&entries(&["/opt/shared/lib.py"]), Path::new("/proj"), true);
        assert!(scope.exact_files.contains(Path::new("/opt/shared/lib.py")));
        assert!(scope.out_of_root.contains(Path::new("/opt/shared/lib.py")));
        assert!(scope.expanded_files.is_empty());
        assert!(scope.allowed_dirs.is_empty());
    }

    #[test]
    fn duplicates_collapse() {
        let resolver = resolver(&["/proj/src/a.rs"]);
        let scope = resolver.resolve(
            &entries(&["src/a.rs", "./src/a.rs", "src\\a.rs", "/proj/src/../src/a.rs"]),
            Path::new("/proj"),
            false,
        );
        assert_eq!(scope.exact_files.len(), 1);
    }

    #[test]
    fn describe_lists_every_part_of_scope() {
        let resolver = resolver(&["/proj/src/a.rs", "/proj/src/b.rs"]);
        let scope = resolver.resolve(&entries(&["src/a.rs"]), Path::new("/proj"), true);
        let text = scope.describe();
        assert!(text.contains("files: /proj/src/a.rs"));
        assert!(text.contains("sibling files: /proj/src/b.rs"));
        assert_eq!(ScopeSet::default().describe(), "(empty scope)");
    }
}
