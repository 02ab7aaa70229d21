use crate::scope::normalize;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Argument keys checked, in order, when extracting a target path.
pub const PATH_ARG_KEYS: [&str; 5] = ["path", "file_path", "filePath", "target_file", "filename"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    Read,
    Write,
    Edit,
    List,
}

impl ToolName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Edit => "edit",
            Self::List => "list",
        }
    }

    /// Accepts the common aliases agents use for the four file tools.
    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "read" | "read_file" | "cat" | "view" => Ok(Self::Read),
            "write" | "write_file" | "create" | "create_file" => Ok(Self::Write),
            "edit" | "edit_file" | "replace" | "str_replace" => Ok(Self::Edit),
            "list" | "ls" | "list_dir" | "list_files" => Ok(Self::List),
            _ => Err(format!(
                "unknown tool `{raw}`; expected one of: read, write, edit, list"
            )),
        }
    }

    /// Read-only tools that may proceed without a resolvable path.
    pub fn is_introspective(self) -> bool {
        matches!(self, Self::Read | Self::List)
    }
}

impl std::fmt::Display for ToolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A tool invocation as proposed by the code generator.
///
/// `resolved_path` is `None` when no usable path argument was present. That
/// is an expected state which the guardrail decides on explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ToolCall {
    pub name: ToolName,
    pub raw_args: BTreeMap<String, String>,
    pub raw_path: Option<String>,
    pub resolved_path: Option<PathBuf>,
}

impl ToolCall {
    pub fn from_args(name: ToolName, raw_args: BTreeMap<String, String>, root: &Path) -> Self {
        let raw_path = extract_raw_path(&raw_args);
        let resolved_path = raw_path.as_deref().map(|raw| normalize(root, raw));
        Self {
            name,
            raw_args,
            raw_path,
            resolved_path,
        }
    }

    pub fn arg(&self, key: &str) -> Option<&str> {
        self.raw_args.get(key).map(String::as_str)
    }

    /// Path shown in logs: the resolved path when known, else the raw one.
    pub fn display_path(&self) -> Option<String> {
        self.resolved_path
            .as_ref()
            .map(|path| path.display().to_string())
            .or_else(|| self.raw_path.clone())
    }

    /// Points the call at `target`, keeping the original raw argument for audit.
    pub fn retarget(&mut self, target: PathBuf) {
        self.resolved_path = Some(target);
    }
}

fn extract_raw_path(raw_args: &BTreeMap<String, String>) -> Option<String> {
    PATH_ARG_KEYS.iter().find_map(|key| {
        raw_args
            .get(*key)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    })
}
