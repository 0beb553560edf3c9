use crate::config::types::{Invocation, Result, SupervisorError};
use crate::config::validator::validate_invocation;
use crate::core::report::ExecutionReport;
use crate::exec::preexec::{Fresh, LaunchError, Target, LAUNCH_FAILURE_EXIT_CODE};
use crate::kernel::descriptor::mark_close_on_exec;
use crate::kernel::rlimit::{cpu_hard_ceiling, current_limit, limit_plan, RlimitSpec};
use crate::kernel::wait::wait_for_child;
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::unistd::{fork, pipe2, read, ForkResult};
use std::os::fd::{AsRawFd, OwnedFd};

fn to_spawn_error(prefix: &str, err: impl std::fmt::Display) -> SupervisorError {
    SupervisorError::Spawn(format!("{prefix}: {err}"))
}

/// Warn when a planned ceiling is above what this process may grant.
fn log_inherited_ceilings(plan: &[RlimitSpec]) {
    let privileged = nix::unistd::geteuid().is_root();
    for spec in plan {
        match current_limit(spec.resource) {
            Ok((_, inherited_hard)) if spec.hard > inherited_hard && !privileged => {
                log::warn!(
                    "{} hard={} exceeds inherited hard limit {}; the target will fail to launch",
                    spec.name,
                    spec.hard,
                    inherited_hard
                );
            }
            Ok(_) => log::debug!("{} soft={} hard={}", spec.name, spec.soft, spec.hard),
            Err(e) => log::debug!("getrlimit for {} failed: {}", spec.name, e),
        }
    }
}

/// Child branch: limit, then replace the image. Never returns.
///
/// On any failure the reason goes to the launch status pipe and the child
/// `_exit`s, so it can never fall through into the supervisor's `main`.
fn run_child(target: Target<Fresh>, plan: &[RlimitSpec], status_write: OwnedFd) -> ! {
    let err = match target.apply_limits(plan) {
        Ok(limited) => limited.exec(),
        Err(err) => err,
    };

    let message = err.encode();
    // A single write below PIPE_BUF is atomic; nothing else to do if it fails.
    let _ = nix::unistd::write(&status_write, &message);

    // SAFETY: _exit skips atexit handlers and destructors inherited from the parent.
    unsafe { libc::_exit(LAUNCH_FAILURE_EXIT_CODE) }
}

/// Read the launch status pipe to EOF.
///
/// EOF with no data means exec succeeded (the write end is close-on-exec).
fn read_launch_status(status_read: &OwnedFd) -> Result<Option<LaunchError>> {
    let mut buf = [0u8; LaunchError::WIRE_SIZE];
    let mut filled = 0;

    while filled < buf.len() {
        match read(status_read.as_raw_fd(), &mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(to_spawn_error("read(launch status)", e)),
        }
    }

    match filled {
        0 => Ok(None),
        LaunchError::WIRE_SIZE => LaunchError::decode(&buf)
            .map(Some)
            .ok_or_else(|| SupervisorError::Spawn("undecodable launch status".to_string())),
        n => Err(SupervisorError::Spawn(format!(
            "truncated launch status: {} of {} bytes",
            n,
            LaunchError::WIRE_SIZE
        ))),
    }
}

/// Run the target once under its limits and build the report.
///
/// Validation and channel hygiene happen before fork; a failure there means
/// no child was ever created.
pub fn supervise(invocation: &Invocation) -> Result<ExecutionReport> {
    validate_invocation(invocation)?;
    mark_close_on_exec(invocation.report_fd)?;

    let argv = invocation.command_cstrings()?;
    let target = Target::<Fresh>::new(argv)
        .ok_or_else(|| SupervisorError::Usage("missing target command".to_string()))?;

    let plan = limit_plan(&invocation.limits, cpu_hard_ceiling());
    log_inherited_ceilings(&plan);

    let (status_read, status_write) =
        pipe2(OFlag::O_CLOEXEC).map_err(|e| to_spawn_error("pipe(launch status)", e))?;

    // SAFETY: the child only calls async-signal-safe functions before exec or _exit.
    let child = match unsafe { fork() }.map_err(|e| to_spawn_error("fork(target)", e))? {
        ForkResult::Child => {
            drop(status_read);
            run_child(target, &plan, status_write)
        }
        ForkResult::Parent { child } => child,
    };
    drop(status_write);
    log::debug!("Spawned target pid {} for {:?}", child, invocation.command);

    let launch = read_launch_status(&status_read)?;
    let usage = wait_for_child(child)?;

    let report = match launch {
        None => ExecutionReport::from_usage(&usage),
        Some(err) => {
            log::warn!("Target {:?} failed to launch: {}", invocation.command[0], err);
            ExecutionReport::launch_failed(&err, &usage)
        }
    };

    log::info!(
        "Target pid {} finished: status={} user={}us sys={}us maxrss={}KB",
        child,
        report.exit_status,
        report.user_time_microseconds,
        report.system_time_microseconds,
        report.peak_memory_kilobytes
    );

    Ok(report)
}

/// Full supervisor run: supervise, then deliver exactly one report.
pub fn run(invocation: &Invocation) -> Result<()> {
    let report = supervise(invocation)?;
    report.write_to_fd(invocation.report_fd)
}
