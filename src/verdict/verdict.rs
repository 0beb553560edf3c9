/// Verdict classification
/// Derives a judging verdict from a decoded report as a pure function of its
/// `exit_status`. Timing and memory figures are reported, never judged here.
use crate::core::report::ExecutionReport;
use serde::{Deserialize, Serialize};

/// Outcome of one supervised run, serialised as `{"type": ..., "code": ...}`.
///
/// `code` is the exit code for `Ok`, the terminating signal for signal
/// verdicts, the errno for `LaunchFailed`, and the raw status for `Unknown`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Verdict {
    /// Exited normally, with any code
    #[serde(rename = "OK")]
    Ok { code: i32 },
    /// Killed by the CPU-limit signal
    #[serde(rename = "TLE")]
    TimeLimit { code: i32 },
    #[serde(rename = "KILLED")]
    Killed { code: i32 },
    /// Killed by the file-size-limit signal
    #[serde(rename = "OLE")]
    OutputLimit { code: i32 },
    #[serde(rename = "RE")]
    RuntimeError { code: i32 },
    /// Never started: limit installation or exec failed
    #[serde(rename = "LAUNCH_FAILED")]
    LaunchFailed { code: i32 },
    #[serde(rename = "UKE")]
    Unknown { code: i32 },
}

impl Verdict {
    pub fn code(&self) -> i32 {
        match *self {
            Verdict::Ok { code }
            | Verdict::TimeLimit { code }
            | Verdict::Killed { code }
            | Verdict::OutputLimit { code }
            | Verdict::RuntimeError { code }
            | Verdict::LaunchFailed { code }
            | Verdict::Unknown { code } => code,
        }
    }

    /// True only for a normal exit with code 0
    pub fn is_success(&self) -> bool {
        matches!(self, Verdict::Ok { code: 0 })
    }
}

/// Verdict classifier - pure function over the report
pub struct VerdictClassifier;

impl VerdictClassifier {
    pub fn classify(report: &ExecutionReport) -> Verdict {
        if report.is_launch_failure() {
            return Verdict::LaunchFailed {
                code: report.exit_status.saturating_neg(),
            };
        }
        Self::classify_wait_status(report.exit_status)
    }

    /// Classify a raw wait status from `wait4(2)`.
    pub fn classify_wait_status(status: i32) -> Verdict {
        if libc::WIFEXITED(status) {
            return Verdict::Ok {
                code: libc::WEXITSTATUS(status),
            };
        }

        if libc::WIFSIGNALED(status) {
            return Self::classify_signal(libc::WTERMSIG(status));
        }

        Verdict::Unknown { code: status }
    }

    fn classify_signal(signal: i32) -> Verdict {
        match signal {
            libc::SIGXCPU => Verdict::TimeLimit { code: signal },
            libc::SIGKILL => Verdict::Killed { code: signal },
            libc::SIGXFSZ => Verdict::OutputLimit { code: signal },
            _ => Verdict::RuntimeError { code: signal },
        }
    }
}

impl ExecutionReport {
    pub fn verdict(&self) -> Verdict {
        VerdictClassifier::classify(self)
    }
}
