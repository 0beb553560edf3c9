//! Kernel resource limits for the target process.
//!
//! Limits attach to the calling process and survive `execve`, so the child
//! sets them on itself between fork and exec. The supervisor only plans and
//! reads them; it never installs them on itself.

use crate::config::types::ResourceLimits;
use nix::errno::Errno;
use nix::sys::resource::{getrlimit, setrlimit, Resource};
use nix::unistd::geteuid;

const RLIM_INFINITY: u64 = u64::MAX;

/// One soft/hard pair to install.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RlimitSpec {
    pub name: &'static str,
    pub resource: Resource,
    pub soft: u64,
    pub hard: u64,
}

impl RlimitSpec {
    /// Install this limit on the calling process.
    ///
    /// Async-signal-safe: a single `setrlimit` call, no allocation.
    pub fn apply(&self) -> Result<(), Errno> {
        setrlimit(self.resource, self.soft, self.hard)
    }
}

/// Expand a limit set into the rlimits the child installs, in order.
///
/// `RLIMIT_CPU` gets one second of headroom on the hard limit: the soft
/// limit raises `SIGXCPU`, and a target that handles it is `SIGKILL`ed at
/// the hard limit. The headroom never goes above `ceiling`, the
/// highest hard limit this process may set (see [`cpu_hard_ceiling`]); when
/// the ceiling equals the soft limit, soft and hard are equal and the target
/// is killed by `SIGXCPU` alone.
pub fn limit_plan(limits: &ResourceLimits, ceiling: u64) -> [RlimitSpec; 3] {
    let cpu = limits.cpu_time_limit_seconds;
    let cpu_hard = if cpu <= ceiling {
        cpu.saturating_add(1).min(ceiling)
    } else {
        // Unattainable either way; setrlimit reports EPERM as a launch failure.
        cpu.saturating_add(1)
    };
    [
        RlimitSpec {
            name: "RLIMIT_CPU",
            resource: Resource::RLIMIT_CPU,
            soft: cpu,
            hard: cpu_hard,
        },
        RlimitSpec {
            name: "RLIMIT_AS",
            resource: Resource::RLIMIT_AS,
            soft: limits.address_space_limit_bytes,
            hard: limits.address_space_limit_bytes,
        },
        RlimitSpec {
            name: "RLIMIT_FSIZE",
            resource: Resource::RLIMIT_FSIZE,
            soft: limits.output_size_limit_bytes,
            hard: limits.output_size_limit_bytes,
        },
    ]
}

/// Highest `RLIMIT_CPU` hard limit the calling process may install.
///
/// Root may raise hard limits, so it is unbounded. Anyone else is held to the
/// inherited hard limit.
pub fn cpu_hard_ceiling() -> u64 {
    if geteuid().is_root() {
        return RLIM_INFINITY;
    }
    match current_limit(Resource::RLIMIT_CPU) {
        Ok((_, hard)) => hard,
        Err(e) => {
            log::debug!("getrlimit(RLIMIT_CPU) failed: {}; assuming no ceiling", e);
            RLIM_INFINITY
        }
    }
}

/// Current (soft, hard) pair for `resource` on the calling process.
pub fn current_limit(resource: Resource) -> Result<(u64, u64), Errno> {
    getrlimit(resource)
}
