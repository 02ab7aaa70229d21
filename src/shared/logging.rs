use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

pub fn security_log_path(state_root: &Path) -> PathBuf {
    state_root.join("logs/security.log")
}

pub fn engine_log_path(state_root: &Path, run_id: &str) -> PathBuf {
    state_root.join("runs").join(run_id).join("engine.log")
}

pub fn append_log_line(path: &Path, line: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    writeln!(file, "{line}")
}

pub fn append_security_log_line(state_root: &Path, line: &str) -> std::io::Result<()> {
    append_log_line(&security_log_path(state_root), line)
}

pub fn append_engine_log_line(state_root: &Path, run_id: &str, line: &str) -> std::io::Result<()> {
    append_log_line(&engine_log_path(state_root, run_id), line)
}

/// Installs the global `tracing` subscriber. `RUST_LOG` wins over `verbose`.
pub fn init_tracing(verbose: bool) {
    let default_directive = if verbose {
        "phasegate=debug"
    } else {
        "phasegate=info"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
