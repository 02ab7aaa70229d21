pub mod cli;
pub mod workflow_command;

pub use cli::{run_cli, Cli, EXIT_FATAL, EXIT_OK, EXIT_USAGE};
pub use workflow_command::{execute, render_report, AppError};
