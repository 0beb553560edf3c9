//! Execution control
//!
//! The child side of the fork: type-state enforced limit installation and exec.

pub mod preexec;
