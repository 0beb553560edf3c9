/// Core types and structures for the rlimit wrapper
use serde::{Deserialize, Serialize};
use std::ffi::{CString, OsString};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::RawFd;
use thiserror::Error;

/// Resource Limit Set applied to the target process before it execs.
///
/// Every value is applied verbatim, zero included; the kernel's own
/// semantics decide what a zero ceiling means for each resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Consumed CPU seconds ceiling (`RLIMIT_CPU`)
    pub cpu_time_limit_seconds: u64,
    /// Virtual address space ceiling in bytes (`RLIMIT_AS`)
    pub address_space_limit_bytes: u64,
    /// Largest file the process may write, in bytes (`RLIMIT_FSIZE`)
    pub output_size_limit_bytes: u64,
}

impl ResourceLimits {
    pub fn new(cpu_seconds: u64, as_bytes: u64, fsize_bytes: u64) -> Self {
        Self {
            cpu_time_limit_seconds: cpu_seconds,
            address_space_limit_bytes: as_bytes,
            output_size_limit_bytes: fsize_bytes,
        }
    }
}

/// One supervisor invocation: limits, the caller's report descriptor, and
/// the target argv (`command[0]` is both the program and the target's argv[0]).
///
/// The argv is kept as raw OS strings: any byte sequence except NUL reaches
/// `execvp` unchanged, UTF-8 or not.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    pub limits: ResourceLimits,
    pub report_fd: RawFd,
    pub command: Vec<OsString>,
}

impl Invocation {
    /// Convert the target argv into the C strings handed to `execvp`.
    ///
    /// Done before fork so the child never allocates under the new ceilings.
    pub fn command_cstrings(&self) -> Result<Vec<CString>> {
        if self.command.is_empty() {
            return Err(SupervisorError::Usage("missing target command".to_string()));
        }
        self.command
            .iter()
            .map(|arg| {
                CString::new(arg.as_bytes()).map_err(|_| {
                    SupervisorError::Usage(format!("argument contains NUL byte: {:?}", arg))
                })
            })
            .collect()
    }
}

/// Error taxonomy for supervisor and caller-side failures.
///
/// None of these is an outcome of the target program; those are carried
/// in the report's `exit_status`.
#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("usage error: {0}")]
    Usage(String),

    #[error("report channel setup failed: {0}")]
    ChannelHygiene(String),

    #[error("spawn failed: {0}")]
    Spawn(String),

    #[error("wait failed: {0}")]
    Wait(String),

    #[error("report write failed: {0}")]
    ReportWrite(String),

    #[error("malformed report: {0}")]
    MalformedReport(String),

    #[error("supervisor failed: {0}")]
    Supervisor(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SupervisorError {
    /// Process exit code for the supervisor binary. Never zero.
    pub fn exit_code(&self) -> i32 {
        match self {
            SupervisorError::Usage(_) => 2,
            _ => 1,
        }
    }
}

impl From<nix::errno::Errno> for SupervisorError {
    fn from(err: nix::errno::Errno) -> Self {
        SupervisorError::Io(std::io::Error::from(err))
    }
}

/// Result type for rlimit wrapper operations
pub type Result<T> = std::result::Result<T, SupervisorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_cstrings_preserve_argv_order() {
        let inv = Invocation {
            limits: ResourceLimits::new(1, 1 << 27, 1 << 20),
            report_fd: 5,
            command: vec!["/bin/sh".into(), "-c".into(), "exit 1".into()],
        };
        let argv = inv.command_cstrings().unwrap();
        assert_eq!(argv.len(), 3);
        assert_eq!(argv[0].to_str().unwrap(), "/bin/sh");
        assert_eq!(argv[2].to_str().unwrap(), "exit 1");
    }

    #[test]
    fn command_cstrings_keep_non_utf8_bytes() {
        use std::os::unix::ffi::OsStringExt;

        let inv = Invocation {
            limits: ResourceLimits::new(1, 1 << 27, 1 << 20),
            report_fd: 5,
            command: vec!["/bin/ls".into(), OsString::from_vec(b"f\xffo".to_vec())],
        };
        let argv = inv.command_cstrings().unwrap();
        assert_eq!(argv[1].as_bytes(), b"f\xffo");
    }

    #[test]
    fn empty_command_is_usage_error() {
        let inv = Invocation {
            limits: ResourceLimits::new(1, 1, 1),
            report_fd: 5,
            command: Vec::new(),
        };
        assert!(matches!(inv.command_cstrings(), Err(SupervisorError::Usage(_))));
    }

    #[test]
    fn nul_byte_in_argument_is_rejected() {
        let inv = Invocation {
            limits: ResourceLimits::new(1, 1, 1),
            report_fd: 5,
            command: vec!["echo".into(), "a\0b".into()],
        };
        assert!(inv.command_cstrings().is_err());
    }

    #[test]
    fn usage_errors_exit_differently_from_runtime_fatals() {
        assert_eq!(SupervisorError::Usage("x".into()).exit_code(), 2);
        assert_eq!(SupervisorError::ReportWrite("x".into()).exit_code(), 1);
        assert_eq!(SupervisorError::ChannelHygiene("x".into()).exit_code(), 1);
    }

    #[test]
    fn errno_converts_to_io_error() {
        let err: SupervisorError = nix::errno::Errno::EBADF.into();
        match err {
            SupervisorError::Io(io) => assert_eq!(io.raw_os_error(), Some(libc::EBADF)),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
