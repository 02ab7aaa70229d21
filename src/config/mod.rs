pub mod error;
pub mod load;
pub mod paths;
pub mod settings;

pub use error::ConfigError;
pub use load::load_settings;
pub use paths::{
    default_settings_path, resolve_codebase_root, resolve_state_dir, DEFAULT_SETTINGS_FILE_NAME,
    DEFAULT_STATE_DIR,
};
pub use settings::{
    EnforcementMode, GuardrailSettings, PhaseDeadlines, ScopeSettings, Settings, ViolationPolicy,
    WorkflowLimits,
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::tempdir;

    #[test]
    fn empty_yaml_yields_defaults() {
        let settings: Settings = serde_yaml::from_str("{}").expect("parse settings");
        assert_eq!(settings.guardrail.mode, EnforcementMode::Hard);
        assert!(settings.scope.expand);
        assert_eq!(settings.scope.source_dir, "src");
        assert_eq!(settings.deadlines, PhaseDeadlines::default());
        assert_eq!(settings.limits.max_tool_call_retries, 3);
        settings.validate().expect("defaults validate");
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let settings: Settings = serde_yaml::from_str(
            r#"
guardrail:
  mode: soft
deadlines:
  impact_analysis_seconds: 5
limits:
  recover_from_errors: true
"#,
        )
        .expect("parse settings");
        assert_eq!(settings.guardrail.mode, EnforcementMode::Soft);
        assert_eq!(settings.deadlines.impact_analysis_seconds, 5);
        assert_eq!(settings.deadlines.fallback_seconds, 60);
        assert!(settings.limits.recover_from_errors);
        assert_eq!(settings.limits.max_phase_retries, 1);
    }

    #[test]
    fn zero_deadline_is_rejected() {
        let settings: Settings =
            serde_yaml::from_str("deadlines:\n  structure_validation_seconds: 0\n")
                .expect("parse settings");
        let err = settings.validate().expect_err("zero deadline");
        assert!(err
            .to_string()
            .contains("deadlines.structure_validation_seconds must be > 0"));
    }

    #[test]
    fn escaping_source_dir_is_rejected() {
        let mut settings = Settings::default();
        settings.scope.source_dir = "../elsewhere".to_string();
        assert!(settings.validate().is_err());
        settings.scope.source_dir = "/abs".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn dotted_extension_is_rejected() {
        let mut settings = Settings::default();
        settings.scope.source_extensions.insert(".rs".to_string());
        assert!(settings.validate().is_err());
    }

    #[test]
    fn sentinels_match_case_insensitively_and_placeholders() {
        let scope = ScopeSettings::default();
        assert!(scope.is_sentinel("TBD"));
        assert!(scope.is_sentinel(" none "));
        assert!(scope.is_sentinel("Unknown"));
        assert!(scope.is_sentinel(""));
        assert!(scope.is_sentinel("<path/to/file>"));
        assert!(!scope.is_sentinel("src/main.rs"));
    }

    #[test]
    fn layer_and_source_checks_ignore_case() {
        let scope = ScopeSettings::default();
        assert!(scope.is_layer_dir("Controllers"));
        assert!(!scope.is_layer_dir("tmp"));
        assert!(scope.is_source_file(Path::new("/p/src/User.JAVA")));
        assert!(!scope.is_source_file(Path::new("/p/src/README.md")));
        assert!(!scope.is_source_file(Path::new("/p/src/Makefile")));
    }

    #[test]
    fn load_settings_prefers_explicit_then_root_file_then_defaults() {
        let root = tempdir().expect("tempdir");
        let loaded = load_settings(root.path(), None).expect("defaults");
        assert_eq!(loaded.guardrail.mode, EnforcementMode::Hard);

        fs::write(
            default_settings_path(root.path()),
            "guardrail:\n  mode: soft\n",
        )
        .expect("write root settings");
        let loaded = load_settings(root.path(), None).expect("root settings");
        assert_eq!(loaded.guardrail.mode, EnforcementMode::Soft);

        let explicit = root.path().join("custom.yaml");
        fs::write(&explicit, "guardrail:\n  case_insensitive: true\n").expect("write custom");
        let loaded = load_settings(root.path(), Some(&explicit)).expect("explicit settings");
        assert_eq!(loaded.guardrail.mode, EnforcementMode::Hard);
        assert!(loaded.guardrail.case_insensitive);
    }

    #[test]
    fn invalid_yaml_reports_path() {
        let root = tempdir().expect("tempdir");
        let path = root.path().join("bad.yaml");
        fs::write(&path, "guardrail: [").expect("write");
        let err = load_settings(root.path(), Some(&path)).expect_err("parse failure");
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("bad.yaml"));
    }

    #[test]
    fn state_dir_precedence() {
        let root = Path::new("/proj");
        assert_eq!(
            resolve_state_dir(root, None, None),
            PathBuf::from("/proj/.phasegate")
        );
        assert_eq!(
            resolve_state_dir(root, None, Some(Path::new("state"))),
            PathBuf::from("/proj/state")
        );
        assert_eq!(
            resolve_state_dir(root, Some(Path::new("/var/pg")), Some(Path::new("state"))),
            PathBuf::from("/var/pg")
        );
    }

    #[test]
    fn missing_codebase_root_is_reported() {
        let root = tempdir().expect("tempdir");
        let missing = root.path().join("nope");
        assert!(matches!(
            resolve_codebase_root(&missing),
            Err(ConfigError::CodebaseRoot { .. })
        ));
        let resolved = resolve_codebase_root(root.path()).expect("existing root");
        assert!(resolved.is_absolute());
    }
}
