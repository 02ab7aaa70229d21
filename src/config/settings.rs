use super::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How the guardrail treats calls that match no scope rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EnforcementMode {
    #[default]
    Hard,
    Soft,
}

impl EnforcementMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hard => "hard",
            Self::Soft => "soft",
        }
    }
}

impl std::fmt::Display for EnforcementMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What the workflow does with high-severity structure violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ViolationPolicy {
    #[default]
    Record,
    Fail,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub guardrail: GuardrailSettings,
    #[serde(default)]
    pub scope: ScopeSettings,
    #[serde(default)]
    pub deadlines: PhaseDeadlines,
    #[serde(default)]
    pub limits: WorkflowLimits,
    #[serde(default)]
    pub state_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GuardrailSettings {
    #[serde(default)]
    pub mode: EnforcementMode,
    #[serde(default)]
    pub case_insensitive: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScopeSettings {
    #[serde(default = "default_true")]
    pub expand: bool,
    #[serde(default = "default_source_dir")]
    pub source_dir: String,
    #[serde(default = "default_layer_dirs")]
    pub layer_dirs: BTreeSet<String>,
    #[serde(default = "default_source_extensions")]
    pub source_extensions: BTreeSet<String>,
    #[serde(default = "default_sentinels")]
    pub sentinels: BTreeSet<String>,
}

impl Default for ScopeSettings {
    fn default() -> Self {
        Self {
            expand: true,
            source_dir: default_source_dir(),
            layer_dirs: default_layer_dirs(),
            source_extensions: default_source_extensions(),
            sentinels: default_sentinels(),
        }
    }
}

impl ScopeSettings {
    /// True for placeholder entries an analysis step emits when it has no real path.
    pub fn is_sentinel(&self, raw: &str) -> bool {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return true;
        }
        if trimmed.starts_with('<') && trimmed.ends_with('>') {
            return true;
        }
        let lowered = trimmed.to_ascii_lowercase();
        self.sentinels
            .iter()
            .any(|sentinel| sentinel.trim().to_ascii_lowercase() == lowered)
    }

    pub fn is_layer_dir(&self, name: &str) -> bool {
        self.layer_dirs
            .iter()
            .any(|layer| layer.eq_ignore_ascii_case(name))
    }

    pub fn is_source_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.source_extensions.contains(&ext.to_ascii_lowercase()))
            .unwrap_or(false)
    }
}

/// Wall-clock budget per phase, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct PhaseDeadlines {
    #[serde(default = "default_context_seconds")]
    pub context_analysis_seconds: u64,
    #[serde(default = "default_intent_seconds")]
    pub intent_parsing_seconds: u64,
    #[serde(default = "default_structure_seconds")]
    pub structure_validation_seconds: u64,
    #[serde(default = "default_impact_seconds")]
    pub impact_analysis_seconds: u64,
    #[serde(default = "default_synthesis_seconds")]
    pub code_synthesis_seconds: u64,
    #[serde(default = "default_execution_seconds")]
    pub execution_seconds: u64,
    #[serde(default = "default_fallback_seconds")]
    pub fallback_seconds: u64,
}

impl Default for PhaseDeadlines {
    fn default() -> Self {
        Self {
            context_analysis_seconds: default_context_seconds(),
            intent_parsing_seconds: default_intent_seconds(),
            structure_validation_seconds: default_structure_seconds(),
            impact_analysis_seconds: default_impact_seconds(),
            code_synthesis_seconds: default_synthesis_seconds(),
            execution_seconds: default_execution_seconds(),
            fallback_seconds: default_fallback_seconds(),
        }
    }
}

impl PhaseDeadlines {
    pub fn fallback(&self) -> Duration {
        Duration::from_secs(self.fallback_seconds)
    }

    fn all(&self) -> [(&'static str, u64); 7] {
        [
            ("context_analysis_seconds", self.context_analysis_seconds),
            ("intent_parsing_seconds", self.intent_parsing_seconds),
            (
                "structure_validation_seconds",
                self.structure_validation_seconds,
            ),
            ("impact_analysis_seconds", self.impact_analysis_seconds),
            ("code_synthesis_seconds", self.code_synthesis_seconds),
            ("execution_seconds", self.execution_seconds),
            ("fallback_seconds", self.fallback_seconds),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct WorkflowLimits {
    #[serde(default = "default_max_tool_call_retries")]
    pub max_tool_call_retries: u32,
    #[serde(default = "default_max_phase_retries")]
    pub max_phase_retries: u32,
    #[serde(default)]
    pub recover_from_errors: bool,
    #[serde(default)]
    pub high_severity_violations: ViolationPolicy,
}

impl Default for WorkflowLimits {
    fn default() -> Self {
        Self {
            max_tool_call_retries: default_max_tool_call_retries(),
            max_phase_retries: default_max_phase_retries(),
            recover_from_errors: false,
            high_severity_violations: ViolationPolicy::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_source_dir() -> String {
    "src".to_string()
}

fn default_layer_dirs() -> BTreeSet<String> {
    [
        "controller",
        "controllers",
        "service",
        "services",
        "model",
        "models",
        "repository",
        "repositories",
        "handler",
        "handlers",
        "route",
        "routes",
        "view",
        "views",
        "dto",
        "dao",
        "entity",
        "entities",
        "schema",
        "schemas",
        "component",
        "components",
        "middleware",
        "api",
        "domain",
        "util",
        "utils",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

fn default_source_extensions() -> BTreeSet<String> {
    [
        "rs", "java", "kt", "scala", "go", "py", "rb", "php", "js", "jsx", "ts", "tsx", "vue",
        "svelte", "c", "h", "cc", "cpp", "hpp", "cs", "swift", "m", "ex", "exs", "erl", "clj",
        "dart", "lua", "sql",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

fn default_sentinels() -> BTreeSet<String> {
    ["TBD", "TODO", "N/A", "none", "unknown", "...", "null", "-"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn default_context_seconds() -> u64 {
    120
}

fn default_intent_seconds() -> u64 {
    120
}

fn default_structure_seconds() -> u64 {
    30
}

fn default_impact_seconds() -> u64 {
    180
}

fn default_synthesis_seconds() -> u64 {
    300
}

fn default_execution_seconds() -> u64 {
    120
}

fn default_fallback_seconds() -> u64 {
    60
}

fn default_max_tool_call_retries() -> u32 {
    3
}

fn default_max_phase_retries() -> u32 {
    1
}

impl Settings {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, seconds) in self.deadlines.all() {
            if seconds == 0 {
                return Err(ConfigError::Settings(format!(
                    "deadlines.{field} must be > 0"
                )));
            }
        }

        let source_dir = self.scope.source_dir.trim();
        if source_dir.is_empty() {
            return Err(ConfigError::Settings(
                "scope.source_dir must be non-empty".to_string(),
            ));
        }
        if Path::new(source_dir).is_absolute() || source_dir.split(['/', '\\']).any(|p| p == "..")
        {
            return Err(ConfigError::Settings(format!(
                "scope.source_dir `{source_dir}` must be relative to the codebase root"
            )));
        }

        for ext in &self.scope.source_extensions {
            if ext.trim().is_empty() || ext.starts_with('.') {
                return Err(ConfigError::Settings(format!(
                    "scope.source_extensions entry `{ext}` must be a bare extension like `rs`"
                )));
            }
        }
        if self.scope.layer_dirs.iter().any(|dir| dir.trim().is_empty()) {
            return Err(ConfigError::Settings(
                "scope.layer_dirs entries must be non-empty".to_string(),
            ));
        }

        if let Some(state_dir) = &self.state_dir {
            if state_dir.as_os_str().is_empty() {
                return Err(ConfigError::Settings(
                    "`state_dir` must be non-empty when set".to_string(),
                ));
            }
        }

        Ok(())
    }
}
