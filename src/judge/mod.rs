//! Caller side of the report channel.
//!
//! What a judging backend does around one supervisor run: set up the report
//! pipe, invoke the binary, collect streams, decode the record.

pub mod runner;
