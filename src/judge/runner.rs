use crate::config::types::{ResourceLimits, Result, SupervisorError};
use crate::core::report::ExecutionReport;
use crate::kernel::descriptor::clear_close_on_exec;
use crate::verdict::verdict::Verdict;
use nix::fcntl::OFlag;
use nix::unistd::pipe2;
use std::ffi::OsString;
use std::fs::File;
use std::io::{Read, Write};
use std::os::fd::AsRawFd;
use std::os::unix::io::RawFd;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;

fn to_supervisor_error(prefix: &str, err: impl std::fmt::Display) -> SupervisorError {
    SupervisorError::Supervisor(format!("{prefix}: {err}"))
}

/// Caller-side invocation of the supervisor binary.
///
/// Owns the report pipe: the write end is inherited by the supervisor (and
/// only by it), the read end stays here.
#[derive(Clone, Debug)]
pub struct SupervisedCommand {
    supervisor: PathBuf,
    limits: ResourceLimits,
    command: Vec<OsString>,
    stdin_data: Option<Vec<u8>>,
}

/// Everything the caller learns from one run
#[derive(Clone, Debug)]
pub struct SupervisedRun {
    pub report: ExecutionReport,
    pub verdict: Verdict,
    pub stdout: String,
    pub stderr: String,
}

impl SupervisedRun {
    pub fn cpu_time_ms(&self) -> f64 {
        self.report.cpu_time_ms()
    }

    pub fn memory_mb(&self) -> f64 {
        self.report.memory_mb()
    }
}

impl SupervisedCommand {
    /// `command` is the target argv; entries may be any OS string.
    pub fn new<I, S>(supervisor: impl Into<PathBuf>, limits: ResourceLimits, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            supervisor: supervisor.into(),
            limits,
            command: command.into_iter().map(Into::into).collect(),
            stdin_data: None,
        }
    }

    /// Bytes fed to the target's stdin; without this stdin is `/dev/null`.
    pub fn stdin(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.stdin_data = Some(data.into());
        self
    }

    /// Positional arguments in invocation order.
    fn supervisor_args(&self, report_fd: RawFd) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            self.limits.cpu_time_limit_seconds.to_string().into(),
            self.limits.address_space_limit_bytes.to_string().into(),
            self.limits.output_size_limit_bytes.to_string().into(),
            report_fd.to_string().into(),
        ];
        args.extend(self.command.iter().cloned());
        args
    }

    /// Run the supervisor to completion and read its single report.
    ///
    /// A non-zero supervisor exit or a missing/partial record is an internal
    /// error, never a target outcome.
    pub fn run(&self) -> Result<SupervisedRun> {
        if self.command.is_empty() {
            return Err(SupervisorError::Usage("missing target command".to_string()));
        }

        let (report_read, report_write) =
            pipe2(OFlag::O_CLOEXEC).map_err(|e| to_supervisor_error("pipe(report)", e))?;
        let report_fd = report_write.as_raw_fd();

        let mut cmd = Command::new(&self.supervisor);
        cmd.args(self.supervisor_args(report_fd))
            .stdin(if self.stdin_data.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // SAFETY: the hook only calls fcntl, which is async-signal-safe.
        unsafe {
            cmd.pre_exec(move || clear_close_on_exec(report_fd).map_err(std::io::Error::from));
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| to_supervisor_error(&format!("spawn {}", self.supervisor.display()), e))?;
        drop(report_write);

        let feeder = match (child.stdin.take(), self.stdin_data.clone()) {
            (Some(mut pipe), Some(data)) => Some(thread::spawn(move || {
                // The target may exit without draining stdin; that is not our failure.
                let _ = pipe.write_all(&data);
            })),
            _ => None,
        };

        let output = child
            .wait_with_output()
            .map_err(|e| to_supervisor_error("wait(supervisor)", e))?;
        if let Some(handle) = feeder {
            let _ = handle.join();
        }

        let mut record = Vec::new();
        File::from(report_read)
            .read_to_end(&mut record)
            .map_err(|e| to_supervisor_error("read(report)", e))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            return Err(SupervisorError::Supervisor(format!(
                "supervisor exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let report = ExecutionReport::decode(&record)
            .map_err(|e| to_supervisor_error("supervisor exited 0 without a usable report", e))?;
        let verdict = report.verdict();
        log::debug!("{:?} -> {:?}", self.command, verdict);

        Ok(SupervisedRun {
            report,
            verdict,
            stdout,
            stderr,
        })
    }
}
