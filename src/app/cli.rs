use clap::{ArgGroup, Parser};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

pub const EXIT_OK: i32 = 0;
pub const EXIT_FATAL: i32 = 1;
pub const EXIT_USAGE: i32 = 2;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "phasegate",
    version,
    about = "Run a phase-gated code-modification workflow with scope-guarded tool calls"
)]
#[command(group(
    ArgGroup::new("request")
        .required(true)
        .args(["feature_request", "feature_request_spec"])
))]
pub struct Cli {
    /// Root of the codebase the agent may modify.
    #[arg(long, value_name = "DIR", value_parser = parse_existing_dir)]
    pub codebase_path: PathBuf,
    /// Feature request text.
    #[arg(long, value_name = "TEXT")]
    pub feature_request: Option<String>,
    /// YAML or JSON file describing the request and the tool calls to replay.
    #[arg(long, value_name = "FILE")]
    pub feature_request_spec: Option<PathBuf>,
    /// Log intended tool calls instead of executing them.
    #[arg(long)]
    pub dry_run: bool,
    /// Warn instead of blocking out-of-scope calls.
    #[arg(long, conflicts_with = "no_guardrail")]
    pub soft_guardrail: bool,
    /// Disable the guardrail entirely (debugging only).
    #[arg(long)]
    pub no_guardrail: bool,
    /// Settings file; defaults to `<codebase>/phasegate.yaml` when present.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Where run artifacts and logs are written.
    #[arg(long, value_name = "DIR")]
    pub state_dir: Option<PathBuf>,
    #[arg(short, long)]
    pub verbose: bool,
}

fn parse_existing_dir(raw: &str) -> Result<PathBuf, String> {
    let path = Path::new(raw);
    if path.is_dir() {
        Ok(path.to_path_buf())
    } else {
        Err(format!("`{raw}` is not an existing directory"))
    }
}

/// Parses `args` (including the program name) and runs the workflow.
/// Returns the process exit code.
pub fn run_cli<I, T>(args: I) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return err.exit_code();
        }
    };
    crate::shared::logging::init_tracing(cli.verbose);

    match super::workflow_command::execute(&cli) {
        Ok(report) => {
            println!("{report}");
            EXIT_OK
        }
        Err(err) => {
            eprintln!("{err}");
            err.exit_code()
        }
    }
}
