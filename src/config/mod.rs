//! Configuration
//!
//! Limit set, invocation model, error taxonomy, and pre-fork validation.

pub mod types;
pub mod validator;
