//! Thin wrappers around Linux kernel primitives.
//!
//! All raw `unsafe` syscalls of the supervisor live here or in [`crate::exec`].

pub mod descriptor;
pub mod rlimit;
pub mod wait;
