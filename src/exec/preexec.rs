//! Pre-Exec Ordering Enforcement
//!
//! The child's setup sequence is FIXED:
//! 1. install RLIMIT_CPU, RLIMIT_AS, RLIMIT_FSIZE on itself
//! 2. exec the target argv
//!
//! Everything here runs between fork and exec, so it must not allocate,
//! lock, or log. The argv and its pointer array are built before fork.

use crate::kernel::rlimit::RlimitSpec;
use nix::errno::Errno;
use nix::sys::resource::Resource;
use std::ffi::CString;
use std::marker::PhantomData;

/// Exit code of a child that never reached the target program.
///
/// Only a fallback: the authoritative launch-failure signal is the launch
/// status pipe, since a target may legitimately exit 127 too.
pub const LAUNCH_FAILURE_EXIT_CODE: i32 = 127;

/// Which pre-exec step failed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum LaunchStage {
    CpuLimit = 1,
    AddressSpaceLimit = 2,
    OutputSizeLimit = 3,
    Exec = 4,
}

impl LaunchStage {
    fn for_resource(resource: Resource) -> Self {
        match resource {
            Resource::RLIMIT_CPU => LaunchStage::CpuLimit,
            Resource::RLIMIT_AS => LaunchStage::AddressSpaceLimit,
            _ => LaunchStage::OutputSizeLimit,
        }
    }

    fn from_wire(raw: u32) -> Option<Self> {
        match raw {
            1 => Some(LaunchStage::CpuLimit),
            2 => Some(LaunchStage::AddressSpaceLimit),
            3 => Some(LaunchStage::OutputSizeLimit),
            4 => Some(LaunchStage::Exec),
            _ => None,
        }
    }
}

impl std::fmt::Display for LaunchStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LaunchStage::CpuLimit => "setrlimit(RLIMIT_CPU)",
            LaunchStage::AddressSpaceLimit => "setrlimit(RLIMIT_AS)",
            LaunchStage::OutputSizeLimit => "setrlimit(RLIMIT_FSIZE)",
            LaunchStage::Exec => "execvp",
        };
        f.write_str(name)
    }
}

/// Why the child could not become the target.
///
/// Travels child → parent over the launch status pipe as 8 bytes:
/// stage (u32 LE) then errno (i32 LE).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LaunchError {
    pub stage: LaunchStage,
    pub errno: Errno,
}

impl LaunchError {
    pub const WIRE_SIZE: usize = 8;

    pub fn encode(&self) -> [u8; Self::WIRE_SIZE] {
        let mut buf = [0u8; Self::WIRE_SIZE];
        buf[..4].copy_from_slice(&(self.stage as u32).to_le_bytes());
        buf[4..].copy_from_slice(&(self.errno as i32).to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() != Self::WIRE_SIZE {
            return None;
        }
        let stage = u32::from_le_bytes(buf[..4].try_into().ok()?);
        let errno = i32::from_le_bytes(buf[4..].try_into().ok()?);
        Some(Self {
            stage: LaunchStage::from_wire(stage)?,
            errno: Errno::from_raw(errno),
        })
    }

    /// Positive errno value; `EIO` stands in if the kernel gave none.
    pub fn errno_value(&self) -> i32 {
        match self.errno as i32 {
            0 => libc::EIO,
            n => n,
        }
    }
}

impl std::fmt::Display for LaunchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} failed: {}", self.stage, self.errno)
    }
}

// ============================================================================
// Type-State Pre-Exec Chain
// ============================================================================
//
// Fresh -> Limited -> exec
//
// Each step consumes the prior state. Only Target<Limited> exposes exec, so
// running the target program without its ceilings does not compile.

/// Type-state marker: forked child, no limits installed yet
pub struct Fresh;

/// Type-state marker: all three limits installed, ready to exec
pub struct Limited;

/// The target program, tracked through the pre-exec chain.
///
/// ```compile_fail
/// use rlimit_wrapper::exec::preexec::{Fresh, Target};
/// let argv = vec![std::ffi::CString::new("/bin/true").unwrap()];
/// let target = Target::<Fresh>::new(argv).unwrap();
/// target.exec();
/// ```
pub struct Target<S> {
    argv: Vec<CString>,
    /// NULL-terminated pointers into `argv`, ready for `execvp`
    argv_ptrs: Vec<*const libc::c_char>,
    _state: PhantomData<S>,
}

impl Target<Fresh> {
    /// Wrap a prepared argv. `None` if it is empty.
    pub fn new(argv: Vec<CString>) -> Option<Self> {
        if argv.is_empty() {
            return None;
        }
        let mut argv_ptrs: Vec<*const libc::c_char> = argv.iter().map(|a| a.as_ptr()).collect();
        argv_ptrs.push(std::ptr::null());
        Some(Self {
            argv,
            argv_ptrs,
            _state: PhantomData,
        })
    }

    /// Install every limit of a plan on the calling process.
    ///
    /// The plan is built before fork. Stops at the first failure; the target
    /// must never start with a partial limit set.
    pub fn apply_limits(self, plan: &[RlimitSpec]) -> Result<Target<Limited>, LaunchError> {
        for spec in plan {
            spec.apply().map_err(|errno| LaunchError {
                stage: LaunchStage::for_resource(spec.resource),
                errno,
            })?;
        }

        Ok(Target {
            argv: self.argv,
            argv_ptrs: self.argv_ptrs,
            _state: PhantomData,
        })
    }
}

impl Target<Limited> {
    /// Replace the process image with the target. Returns only on failure.
    ///
    /// The Rust runtime ignores SIGPIPE and ignored dispositions survive
    /// exec, so the default is restored first.
    pub fn exec(self) -> LaunchError {
        // SAFETY: signal() is async-signal-safe. argv_ptrs points into
        // self.argv, which outlives the call, and is NULL-terminated.
        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_DFL);
            libc::execvp(self.argv[0].as_ptr(), self.argv_ptrs.as_ptr());
        }
        LaunchError {
            stage: LaunchStage::Exec,
            errno: Errno::last(),
        }
    }
}
