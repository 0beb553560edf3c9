//! Verdict classification
//!
//! Caller-side interpretation of a decoded report.

pub mod verdict;
