//! End-to-end tests for the rlimit-wrapper binary
//!
//! These drive the built supervisor the way a judging backend does: through
//! a report pipe inherited at a known descriptor number.

use nix::fcntl::{fcntl, FcntlArg, FdFlag, OFlag};
use nix::unistd::pipe2;
use rlimit_wrapper::{ExecutionReport, ResourceLimits, SupervisedCommand, Verdict, REPORT_SIZE};
use std::ffi::OsString;
use std::fs::File;
use std::io::Read;
use std::os::fd::AsRawFd;
use std::os::unix::ffi::OsStringExt;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

const SUPERVISOR: &str = env!("CARGO_BIN_EXE_rlimit-wrapper");

fn limits() -> ResourceLimits {
    ResourceLimits::new(1, 134217728, 1048576)
}

fn run(limits: ResourceLimits, command: &[&str]) -> rlimit_wrapper::SupervisedRun {
    SupervisedCommand::new(SUPERVISOR, limits, command.iter().copied())
        .run()
        .expect("supervisor run failed")
}

/// Spawn the supervisor with raw arguments and an inherited report pipe.
/// `args` receives the report fd number. Returns exit status and every byte
/// that appeared on the channel.
fn spawn_raw(args: impl FnOnce(i32) -> Vec<OsString>) -> (ExitStatus, Vec<u8>) {
    let (rd, wr) = pipe2(OFlag::O_CLOEXEC).unwrap();
    let fd = wr.as_raw_fd();

    let mut cmd = Command::new(SUPERVISOR);
    cmd.args(args(fd))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    unsafe {
        cmd.pre_exec(move || {
            fcntl(fd, FcntlArg::F_SETFD(FdFlag::empty()))
                .map(|_| ())
                .map_err(std::io::Error::from)
        });
    }

    let status = cmd.status().unwrap();
    drop(wr);

    let mut bytes = Vec::new();
    File::from(rd).read_to_end(&mut bytes).unwrap();
    (status, bytes)
}

#[test]
fn test_exit_codes_are_reported_verbatim() {
    for code in [0, 1, 42, 255] {
        let script = format!("exit {code}");
        let result = run(limits(), &["/bin/sh", "-c", &script]);
        assert_eq!(result.verdict, Verdict::Ok { code });
        assert!(libc::WIFEXITED(result.report.exit_status));
    }
}

#[test]
fn test_cpu_limit_terminates_with_sigxcpu() {
    let started = Instant::now();
    let result = run(limits(), &["/bin/sh", "-c", "while :; do :; done"]);

    assert_eq!(
        result.verdict,
        Verdict::TimeLimit {
            code: libc::SIGXCPU
        }
    );
    let cpu_us = result.report.user_time_microseconds + result.report.system_time_microseconds;
    assert!(cpu_us >= 900_000, "stopped too early: {cpu_us}us");
    assert!(cpu_us < 2_500_000, "overshot the limit: {cpu_us}us");
    assert!(started.elapsed() < Duration::from_secs(30));
}

#[test]
fn test_address_space_limit_fails_allocation_inside_target() {
    if !Path::new("/bin/dd").exists() {
        return;
    }
    // dd allocates its block buffer up front; 256 MiB cannot fit under 64 MiB.
    let result = run(
        ResourceLimits::new(5, 64 * 1024 * 1024, 1048576),
        &["/bin/dd", "if=/dev/zero", "of=/dev/null", "bs=256M", "count=1"],
    );

    match result.verdict {
        Verdict::Ok { code } => assert_ne!(code, 0, "allocation should have failed"),
        other => panic!("expected the target to exit on its own, got {other:?}"),
    }
}

#[test]
fn test_output_limit_terminates_with_sigxfsz() {
    if !Path::new("/bin/dd").exists() {
        return;
    }
    let out = Path::new(env!("CARGO_TARGET_TMPDIR")).join(format!("fsize-{}", std::process::id()));
    let of = format!("of={}", out.display());

    let result = run(
        ResourceLimits::new(5, 134217728, 4096),
        &["/bin/dd", "if=/dev/zero", &of, "bs=4096", "count=16"],
    );
    let _ = std::fs::remove_file(&out);

    assert_eq!(
        result.verdict,
        Verdict::OutputLimit {
            code: libc::SIGXFSZ
        }
    );
}

#[test]
fn test_too_few_arguments_write_nothing() {
    let (status, bytes) = spawn_raw(|_| vec!["1".into(), "134217728".into(), "1048576".into()]);
    assert!(!status.success());
    assert!(bytes.is_empty());
}

#[test]
fn test_missing_command_writes_nothing() {
    let (status, bytes) = spawn_raw(|fd| {
        vec![
            "1".into(),
            "134217728".into(),
            "1048576".into(),
            fd.to_string().into(),
        ]
    });
    assert!(!status.success());
    assert!(bytes.is_empty());
}

#[test]
fn test_closed_report_fd_is_fatal() {
    // Descriptor 250 is not open in the supervisor.
    let (status, bytes) = spawn_raw(|_| {
        vec![
            "1".into(),
            "134217728".into(),
            "1048576".into(),
            "250".into(),
            "/bin/true".into(),
        ]
    });
    assert_eq!(status.code(), Some(1));
    assert!(bytes.is_empty());
}

#[test]
fn test_successful_run_writes_exactly_one_record() {
    let (status, bytes) = spawn_raw(|fd| {
        vec![
            "1".into(),
            "134217728".into(),
            "1048576".into(),
            fd.to_string().into(),
            "/bin/sh".into(),
            "-c".into(),
            "exit 7".into(),
        ]
    });
    assert!(status.success());
    assert_eq!(bytes.len(), REPORT_SIZE);
    let report = ExecutionReport::decode(&bytes).unwrap();
    assert_eq!(report.verdict(), Verdict::Ok { code: 7 });
}

#[test]
fn test_non_utf8_argument_reaches_target_unchanged() {
    // The target exits 0 only if $1 is exactly the bytes 'f', 0xff, 'o'.
    let (status, bytes) = spawn_raw(|fd| {
        vec![
            "1".into(),
            "134217728".into(),
            "1048576".into(),
            fd.to_string().into(),
            "/bin/sh".into(),
            "-c".into(),
            r#"[ "$1" = "$(printf 'f\377o')" ]"#.into(),
            "sh".into(),
            OsString::from_vec(b"f\xffo".to_vec()),
        ]
    });
    assert!(status.success());
    let report = ExecutionReport::decode(&bytes).unwrap();
    assert_eq!(report.verdict(), Verdict::Ok { code: 0 });
}

#[test]
fn test_read_only_report_fd_fails_before_spawn() {
    let (rd, _wr) = pipe2(OFlag::O_CLOEXEC).unwrap();
    let fd = rd.as_raw_fd();
    let marker = Path::new(env!("CARGO_TARGET_TMPDIR")).join(format!("ro-fd-{}", std::process::id()));
    let _ = std::fs::remove_file(&marker);

    let mut cmd = Command::new(SUPERVISOR);
    cmd.args(["1", "134217728", "1048576", &fd.to_string(), "/bin/touch"])
        .arg(&marker)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    unsafe {
        cmd.pre_exec(move || {
            fcntl(fd, FcntlArg::F_SETFD(FdFlag::empty()))
                .map(|_| ())
                .map_err(std::io::Error::from)
        });
    }

    let status = cmd.status().unwrap();
    assert_eq!(status.code(), Some(1));
    assert!(!marker.exists(), "target ran despite an unusable report fd");
}

#[test]
fn test_report_channel_hidden_from_target() {
    let (status, bytes) = spawn_raw(|fd| {
        vec![
            "1".into(),
            "134217728".into(),
            "1048576".into(),
            fd.to_string().into(),
            "/bin/sh".into(),
            "-c".into(),
            format!("if [ -e /proc/self/fd/{fd} ]; then exit 9; fi; exit 0").into(),
        ]
    });
    assert!(status.success());
    let report = ExecutionReport::decode(&bytes).unwrap();
    assert_eq!(report.verdict(), Verdict::Ok { code: 0 });
}

#[test]
fn test_launch_failure_is_distinguishable_from_exit_one() {
    let missing = run(limits(), &["/no/such/binary"]);
    let exit_one = run(limits(), &["/bin/sh", "-c", "exit 1"]);

    assert_eq!(
        missing.verdict,
        Verdict::LaunchFailed {
            code: libc::ENOENT
        }
    );
    assert_eq!(exit_one.verdict, Verdict::Ok { code: 1 });
    assert_ne!(missing.report.encode(), exit_one.report.encode());
}

#[test]
fn test_target_streams_are_passed_through() {
    let result = SupervisedCommand::new(SUPERVISOR, limits(), ["/bin/cat"])
        .stdin("hello from stdin\n")
        .run()
        .unwrap();
    assert_eq!(result.verdict, Verdict::Ok { code: 0 });
    assert_eq!(result.stdout, "hello from stdin\n");

    let result = run(limits(), &["/bin/sh", "-c", "echo oops >&2; exit 3"]);
    assert_eq!(result.verdict, Verdict::Ok { code: 3 });
    assert_eq!(result.stderr, "oops\n");
}

#[test]
fn test_repeated_runs_agree() {
    let first = run(limits(), &["/bin/sh", "-c", "exit 5"]);
    let second = run(limits(), &["/bin/sh", "-c", "exit 5"]);

    assert_eq!(first.report.exit_status, second.report.exit_status);
    let diff = first.cpu_time_ms() - second.cpu_time_ms();
    assert!(diff.abs() < 100.0, "timing drifted by {diff}ms");
    assert!(first.report.peak_memory_kilobytes > 0);
}
