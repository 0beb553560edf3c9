//! Supervisor core.
//!
//! Owns the per-invocation process model (fork, limited child, blocking wait)
//! and the binary report delivered to the caller.

pub mod report;
pub mod supervisor;
