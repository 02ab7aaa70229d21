use crate::config::ConfigError;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_STATE_DIR: &str = ".phasegate";
pub const DEFAULT_SETTINGS_FILE_NAME: &str = "phasegate.yaml";

/// Canonical absolute form of the codebase root. The root must already exist.
pub fn resolve_codebase_root(path: &Path) -> Result<PathBuf, ConfigError> {
    let canonical = fs::canonicalize(path).map_err(|_| ConfigError::CodebaseRoot {
        path: path.display().to_string(),
    })?;
    if !canonical.is_dir() {
        return Err(ConfigError::CodebaseRoot {
            path: path.display().to_string(),
        });
    }
    Ok(canonical)
}

/// State dir precedence: explicit override, then settings, then `<root>/.phasegate`.
pub fn resolve_state_dir(
    codebase_root: &Path,
    cli_override: Option<&Path>,
    configured: Option<&Path>,
) -> PathBuf {
    let chosen = cli_override
        .or(configured)
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR));
    if chosen.is_absolute() {
        chosen
    } else {
        codebase_root.join(chosen)
    }
}

pub fn default_settings_path(codebase_root: &Path) -> PathBuf {
    codebase_root.join(DEFAULT_SETTINGS_FILE_NAME)
}
