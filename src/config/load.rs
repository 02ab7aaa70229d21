use super::{default_settings_path, ConfigError, Settings};
use std::path::Path;

/// Loads settings from `explicit` when given, else from `<root>/phasegate.yaml`
/// if present, else defaults. The result is always validated.
pub fn load_settings(codebase_root: &Path, explicit: Option<&Path>) -> Result<Settings, ConfigError> {
    let settings = match explicit {
        Some(path) => Settings::from_path(path)?,
        None => {
            let candidate = default_settings_path(codebase_root);
            if candidate.is_file() {
                Settings::from_path(&candidate)?
            } else {
                Settings::default()
            }
        }
    };
    settings.validate()?;
    Ok(settings)
}
