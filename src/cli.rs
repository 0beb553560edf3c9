use crate::config::types::{Invocation, ResourceLimits, SupervisorError};
use crate::core::supervisor;
use anyhow::{Context, Result};
use clap::Parser;
use std::ffi::OsString;

/// Run one command under CPU, address-space and file-size limits and write
/// a fixed-size binary report to REPORT_FD.
///
/// Help and version flags are disabled: every invocation either writes a
/// report and exits 0, or exits non-zero without one.
#[derive(Parser, Debug)]
#[command(
    name = "rlimit-wrapper",
    disable_help_flag = true,
    disable_version_flag = true
)]
struct Cli {
    /// CPU time limit in seconds (RLIMIT_CPU)
    cpu_seconds: u64,
    /// Address space limit in bytes (RLIMIT_AS)
    as_bytes: u64,
    /// Output file size limit in bytes (RLIMIT_FSIZE)
    fsize_bytes: u64,
    /// Already-open writable descriptor that receives the report
    #[arg(value_parser = clap::value_parser!(i32).range(0..))]
    report_fd: i32,
    /// Target command followed by its arguments, passed through verbatim
    #[arg(
        required = true,
        num_args = 1..,
        trailing_var_arg = true,
        allow_hyphen_values = true,
        value_parser = clap::value_parser!(OsString)
    )]
    command: Vec<OsString>,
}

impl From<Cli> for Invocation {
    fn from(cli: Cli) -> Self {
        Invocation {
            limits: ResourceLimits::new(cli.cpu_seconds, cli.as_bytes, cli.fsize_bytes),
            report_fd: cli.report_fd,
            command: cli.command,
        }
    }
}

/// Parse a full argv (program name first) into an invocation.
pub fn parse_invocation<I, T>(args: I) -> std::result::Result<Invocation, SupervisorError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    Cli::try_parse_from(args)
        .map(Invocation::from)
        .map_err(|e| SupervisorError::Usage(e.to_string().trim_end().to_string()))
}

/// Exit code for a fatal error: the supervisor's own code when known, else 1.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<SupervisorError>()
        .map(SupervisorError::exit_code)
        .unwrap_or(1)
}

fn try_run() -> Result<()> {
    let invocation = parse_invocation(std::env::args_os())?;
    log::debug!("Invocation: {:?}", invocation);

    supervisor::run(&invocation)
        .with_context(|| format!("supervising {:?}", invocation.command[0]))?;
    Ok(())
}

/// Binary entrypoint. Returns the process exit code.
pub fn run() -> i32 {
    // stderr is shared with the target, so stay quiet unless RUST_LOG asks otherwise.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("error")).init();

    match try_run() {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("rlimit-wrapper: {:#}", err);
            exit_code(&err)
        }
    }
}
