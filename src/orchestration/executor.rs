use crate::guardrail::{ToolCall, ToolName};
use crate::orchestration::collaborators::{PatchResult, ToolExecutor};
use crate::shared::fs_atomic::atomic_write_file;
use std::fs;
use std::path::{Path, PathBuf};

/// Applies approved calls to the real filesystem. Writes are atomic.
#[derive(Debug, Clone)]
pub struct FsToolExecutor {
    codebase_root: PathBuf,
}

impl FsToolExecutor {
    pub fn new(codebase_root: impl Into<PathBuf>) -> Self {
        Self {
            codebase_root: codebase_root.into(),
        }
    }

    fn apply(&self, call: &ToolCall) -> Result<String, String> {
        let target = match (call.resolved_path.as_deref(), call.name) {
            (Some(path), _) => path,
            (None, ToolName::List) => self.codebase_root.as_path(),
            (None, name) => return Err(format!("`{name}` requires a path argument")),
        };
        match call.name {
            ToolName::Read => {
                let content = fs::read_to_string(target).map_err(|e| describe(target, e))?;
                Ok(format!("read {} bytes", content.len()))
            }
            ToolName::List => {
                let count = fs::read_dir(target)
                    .map_err(|e| describe(target, e))?
                    .filter_map(Result::ok)
                    .count();
                Ok(format!("listed {count} entries"))
            }
            ToolName::Write => {
                let content = call.arg("content").unwrap_or_default();
                atomic_write_file(target, content.as_bytes()).map_err(|e| describe(target, e))?;
                Ok(format!("wrote {} bytes", content.len()))
            }
            ToolName::Edit => {
                let old = call.arg("old_string").unwrap_or_default();
                let new = call.arg("new_string").unwrap_or_default();
                if old.is_empty() {
                    return Err("edit requires a non-empty `old_string`".to_string());
                }
                let current = fs::read_to_string(target).map_err(|e| describe(target, e))?;
                let occurrences = current.matches(old).count();
                if occurrences != 1 {
                    return Err(format!(
                        "`old_string` must occur exactly once in {}, found {occurrences}",
                        target.display()
                    ));
                }
                let updated = current.replacen(old, new, 1);
                atomic_write_file(target, updated.as_bytes()).map_err(|e| describe(target, e))?;
                Ok("replaced 1 occurrence".to_string())
            }
        }
    }
}

impl ToolExecutor for FsToolExecutor {
    fn execute(&self, call: &ToolCall) -> PatchResult {
        let (success, message) = match self.apply(call) {
            Ok(message) => (true, message),
            Err(message) => (false, message),
        };
        PatchResult {
            tool: call.name,
            path: call.display_path(),
            success,
            message,
        }
    }
}

fn describe(path: &Path, err: std::io::Error) -> String {
    format!("{}: {err}", path.display())
}

/// Records what would happen without touching the filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunExecutor;

impl ToolExecutor for DryRunExecutor {
    fn execute(&self, call: &ToolCall) -> PatchResult {
        let path = call.display_path();
        tracing::info!(
            tool = %call.name,
            path = path.as_deref().unwrap_or(""),
            "dry run: skipping tool call"
        );
        PatchResult {
            tool: call.name,
            message: format!(
                "dry run: would {} {}",
                call.name,
                path.as_deref().unwrap_or("<codebase root>")
            ),
            path,
            success: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn call(root: &Path, name: ToolName, pairs: &[(&str, &str)]) -> ToolCall {
        let args: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ToolCall::from_args(name, args, root)
    }

    #[test]
    fn write_then_edit_then_read() {
        let dir = tempdir().expect("tempdir");
        let executor = FsToolExecutor::new(dir.path());

        let write = executor.execute(&call(
            dir.path(),
            ToolName::Write,
            &[("path", "src/lib.rs"), ("content", "fn old() {}\n")],
        ));
        assert!(write.success, "{}", write.message);

        let edit = executor.execute(&call(
            dir.path(),
            ToolName::Edit,
            &[
                ("path", "src/lib.rs"),
                ("old_string", "old"),
                ("new_string", "new"),
            ],
        ));
        assert!(edit.success, "{}", edit.message);
        assert_eq!(
            fs::read_to_string(dir.path().join("src/lib.rs")).expect("read"),
            "fn new() {}\n"
        );

        let read = executor.execute(&call(dir.path(), ToolName::Read, &[("path", "src/lib.rs")]));
        assert_eq!(read.message, "read 12 bytes");
    }

    #[test]
    fn ambiguous_edit_fails_without_writing() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("a.txt"), "x x").expect("seed");
        let executor = FsToolExecutor::new(dir.path());
        let result = executor.execute(&call(
            dir.path(),
            ToolName::Edit,
            &[("path", "a.txt"), ("old_string", "x"), ("new_string", "y")],
        ));
        assert!(!result.success);
        assert_eq!(fs::read_to_string(dir.path().join("a.txt")).expect("read"), "x x");
    }

    #[test]
    fn list_without_path_lists_root() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("a.txt"), "").expect("seed");
        let executor = FsToolExecutor::new(dir.path());
        let result = executor.execute(&call(dir.path(), ToolName::List, &[]));
        assert!(result.success);
        assert_eq!(result.message, "listed 1 entries");
    }

    #[test]
    fn read_without_path_is_reported_not_attempted() {
        let dir = tempdir().expect("tempdir");
        let executor = FsToolExecutor::new(dir.path());
        let result = executor.execute(&call(dir.path(), ToolName::Read, &[]));
        assert!(!result.success);
        assert_eq!(result.message, "`read` requires a path argument");
    }

    #[test]
    fn dry_run_touches_nothing() {
        let dir = tempdir().expect("tempdir");
        let result = DryRunExecutor.execute(&call(
            dir.path(),
            ToolName::Write,
            &[("path", "out.rs"), ("content", "x")],
        ));
        assert!(result.success);
        assert!(result.message.starts_with("dry run: would write"));
        assert!(!dir.path().join("out.rs").exists());
    }
}
