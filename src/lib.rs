//! rlimit-wrapper: run one untrusted command under kernel resource limits
//! and hand exact execution statistics back to the caller over a binary
//! report channel.
//!
//! # Architecture
//!
//! ## Configuration ([`config`])
//! - [`config::types`]: Resource Limit Set, invocation model, error taxonomy
//! - [`config::validator`]: pre-fork checks on the report channel and limits
//!
//! ## Kernel Primitives ([`kernel`])
//! - [`kernel::rlimit`]: `RLIMIT_CPU` / `RLIMIT_AS` / `RLIMIT_FSIZE` plans
//! - [`kernel::descriptor`]: close-on-exec marking for the report channel
//! - [`kernel::wait`]: `wait4` with rusage for one specific child
//!
//! ## Execution Control ([`exec`])
//! - [`exec::preexec`]: type-state enforced limit-then-exec chain
//!
//! ## Supervisor Core ([`core`])
//! - [`core::supervisor`]: fork, child branch, blocking wait, report
//! - [`core::report`]: packed 28-byte little-endian report codec
//!
//! ## Caller Side
//! - [`verdict::verdict`]: report → verdict classification
//! - [`judge::runner`]: invoke the supervisor binary and read its report
//!
//! # Invocation
//!
//! ```text
//! rlimit-wrapper <cpu_seconds> <as_bytes> <fsize_bytes> <report_fd> <command> [args...]
//! ```
//!
//! Exit 0 means exactly one report was written, whatever the target did.
//! Any non-zero exit means no report was produced.

// Configuration
pub mod config;

// Kernel Primitives
pub mod kernel;

// Execution Control
pub mod exec;

// Supervisor Core
pub mod core;

// Verdicts
pub mod verdict;

// Caller-side runner
pub mod judge;

// CLI entrypoint wiring for the rlimit-wrapper binary.
pub mod cli;

pub use crate::config::types::{Invocation, ResourceLimits, Result, SupervisorError};
pub use crate::core::report::{ExecutionReport, REPORT_SIZE};
pub use crate::judge::runner::{SupervisedCommand, SupervisedRun};
pub use crate::verdict::verdict::Verdict;
