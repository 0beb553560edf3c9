//! Blocking wait with resource accounting for one specific child.

use crate::config::types::{Result, SupervisorError};
use nix::errno::Errno;
use nix::unistd::Pid;

/// Wait status and usage of a reaped child, as reported by `wait4(2)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChildUsage {
    /// Raw wait status
    pub status: i32,
    pub user_time_us: u64,
    pub system_time_us: u64,
    /// `ru_maxrss`, kilobytes on Linux
    pub max_rss_kb: u64,
}

fn timeval_to_us(tv: libc::timeval) -> u64 {
    let secs = tv.tv_sec.max(0) as u64;
    let usecs = tv.tv_usec.max(0) as u64;
    secs.saturating_mul(1_000_000).saturating_add(usecs)
}

impl ChildUsage {
    fn from_raw(status: i32, usage: &libc::rusage) -> Self {
        Self {
            status,
            user_time_us: timeval_to_us(usage.ru_utime),
            system_time_us: timeval_to_us(usage.ru_stime),
            max_rss_kb: usage.ru_maxrss.max(0) as u64,
        }
    }
}

/// Block until `pid` terminates and collect its status and rusage.
///
/// Waits on that pid only, with no timeout. `EINTR` is retried; any other
/// error is fatal for the run.
pub fn wait_for_child(pid: Pid) -> Result<ChildUsage> {
    let mut status: libc::c_int = 0;
    // SAFETY: rusage is plain old data; all-zero is a valid value.
    let mut usage: libc::rusage = unsafe { std::mem::zeroed() };

    loop {
        // SAFETY: both out-pointers reference live locals for the whole call.
        let rc = unsafe { libc::wait4(pid.as_raw(), &mut status, 0, &mut usage) };
        if rc == pid.as_raw() {
            return Ok(ChildUsage::from_raw(status, &usage));
        }

        match Errno::last() {
            Errno::EINTR => continue,
            errno => {
                return Err(SupervisorError::Wait(format!(
                    "wait4({}) failed: {}",
                    pid, errno
                )))
            }
        }
    }
}
