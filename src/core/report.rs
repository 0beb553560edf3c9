//! Execution Report wire codec.
//!
//! Packed little-endian record, 28 bytes, no padding:
//!
//! | offset | size | field                                   |
//! |--------|------|-----------------------------------------|
//! | 0      | 4    | `exit_status` (i32)                     |
//! | 4      | 8    | `user_time_microseconds` (u64)          |
//! | 12     | 8    | `system_time_microseconds` (u64)        |
//! | 20     | 8    | `peak_memory_kilobytes` (u64)           |
//!
//! `exit_status` holds the raw wait status of the target. Wait statuses are
//! never negative, so a negative value is reserved for launch failure and
//! carries `-errno` of the failed pre-exec step.

use crate::config::types::{Result, SupervisorError};
use crate::exec::preexec::LaunchError;
use crate::kernel::wait::ChildUsage;
use nix::errno::Errno;
use serde::{Deserialize, Serialize};
use std::os::fd::BorrowedFd;
use std::os::unix::io::RawFd;

/// Size of one encoded report in bytes
pub const REPORT_SIZE: usize = 28;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub exit_status: i32,
    pub user_time_microseconds: u64,
    pub system_time_microseconds: u64,
    pub peak_memory_kilobytes: u64,
}

impl ExecutionReport {
    /// Report for a target that ran and terminated by any means.
    pub fn from_usage(usage: &ChildUsage) -> Self {
        Self {
            exit_status: usage.status,
            user_time_microseconds: usage.user_time_us,
            system_time_microseconds: usage.system_time_us,
            peak_memory_kilobytes: usage.max_rss_kb,
        }
    }

    /// Report for a child that never became the target.
    pub fn launch_failed(err: &LaunchError, usage: &ChildUsage) -> Self {
        Self {
            exit_status: -err.errno_value(),
            ..Self::from_usage(usage)
        }
    }

    pub fn is_launch_failure(&self) -> bool {
        self.exit_status < 0
    }

    /// errno of the failed launch, if this report describes one
    pub fn launch_errno(&self) -> Option<Errno> {
        if self.is_launch_failure() {
            Some(Errno::from_raw(self.exit_status.saturating_neg()))
        } else {
            None
        }
    }

    /// User CPU time in milliseconds, the figure judges compare to time limits
    pub fn cpu_time_ms(&self) -> f64 {
        self.user_time_microseconds as f64 / 1000.0
    }

    pub fn memory_mb(&self) -> f64 {
        self.peak_memory_kilobytes as f64 / 1024.0
    }

    pub fn encode(&self) -> [u8; REPORT_SIZE] {
        let mut buf = [0u8; REPORT_SIZE];
        buf[0..4].copy_from_slice(&self.exit_status.to_le_bytes());
        buf[4..12].copy_from_slice(&self.user_time_microseconds.to_le_bytes());
        buf[12..20].copy_from_slice(&self.system_time_microseconds.to_le_bytes());
        buf[20..28].copy_from_slice(&self.peak_memory_kilobytes.to_le_bytes());
        buf
    }

    /// Decode exactly one record. Anything but `REPORT_SIZE` bytes is rejected,
    /// so a partially delivered record is never trusted.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let buf: &[u8; REPORT_SIZE] = buf.try_into().map_err(|_| {
            SupervisorError::MalformedReport(format!(
                "expected {} bytes, got {}",
                REPORT_SIZE,
                buf.len()
            ))
        })?;

        let u64_at = |offset: usize| {
            let mut field = [0u8; 8];
            field.copy_from_slice(&buf[offset..offset + 8]);
            u64::from_le_bytes(field)
        };

        Ok(Self {
            exit_status: i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            user_time_microseconds: u64_at(4),
            system_time_microseconds: u64_at(12),
            peak_memory_kilobytes: u64_at(20),
        })
    }

    /// Write the record to the caller's channel in one `write(2)`.
    ///
    /// `EINTR` before any byte is written is retried; a short write is fatal.
    pub fn write_to_fd(&self, fd: RawFd) -> Result<()> {
        let payload = self.encode();
        // SAFETY: the caller guarantees `fd` stays open for the duration of this call.
        let channel = unsafe { BorrowedFd::borrow_raw(fd) };

        loop {
            match nix::unistd::write(channel, &payload) {
                Ok(n) if n == REPORT_SIZE => return Ok(()),
                Ok(n) => {
                    return Err(SupervisorError::ReportWrite(format!(
                        "short write on fd {}: {} of {} bytes",
                        fd, n, REPORT_SIZE
                    )))
                }
                Err(Errno::EINTR) => continue,
                Err(e) => {
                    return Err(SupervisorError::ReportWrite(format!(
                        "write on fd {} failed: {}",
                        fd, e
                    )))
                }
            }
        }
    }
}
