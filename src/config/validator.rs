// Invocation validation
// Runs before fork; any error here means no child is ever created and no report is written.

use crate::config::types::{Invocation, ResourceLimits, Result, SupervisorError};
use crate::kernel::descriptor;
use std::os::unix::io::RawFd;

/// Smallest address-space ceiling that still leaves room for a dynamic loader
const MIN_PRACTICAL_AS_BYTES: u64 = 4 * 1024 * 1024;

/// Validation result with detailed errors
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn add_error(&mut self, error: String) {
        self.valid = false;
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

/// Validate an invocation before the report channel is touched.
///
/// Channel problems are fatal. Limit values are never rejected, only
/// flagged when the kernel will treat them in a surprising way.
pub fn validate_invocation(invocation: &Invocation) -> Result<ValidationResult> {
    let mut result = ValidationResult::new();

    validate_report_fd(invocation.report_fd, &mut result);
    validate_limits(&invocation.limits, &mut result);

    if invocation.command.is_empty() {
        return Err(SupervisorError::Usage("missing target command".to_string()));
    }

    for warning in &result.warnings {
        log::warn!("{}", warning);
    }

    if !result.is_valid() {
        return Err(SupervisorError::ChannelHygiene(result.errors.join("; ")));
    }

    Ok(result)
}

fn validate_report_fd(fd: RawFd, result: &mut ValidationResult) {
    if (0..=2).contains(&fd) {
        // Marking a standard stream close-on-exec would strip the target's stdio.
        result.add_error(format!(
            "report fd {} is a standard stream; pass a dedicated descriptor",
            fd
        ));
        return;
    }

    if let Err(e) = descriptor::descriptor_flags(fd) {
        result.add_error(format!("report fd {} is not open: {}", fd, e));
        return;
    }

    match descriptor::is_writable(fd) {
        Ok(true) => {}
        Ok(false) => result.add_error(format!("report fd {} is not open for writing", fd)),
        Err(e) => result.add_error(format!("F_GETFL on report fd {} failed: {}", fd, e)),
    }
}

fn validate_limits(limits: &ResourceLimits, result: &mut ValidationResult) {
    if limits.cpu_time_limit_seconds == 0 {
        result.add_warning("cpu limit 0 is enforced by the kernel as 1 second".to_string());
    }

    if limits.address_space_limit_bytes < MIN_PRACTICAL_AS_BYTES {
        result.add_warning(format!(
            "address space limit {} bytes will likely make exec fail",
            limits.address_space_limit_bytes
        ));
    }

    if limits.output_size_limit_bytes == 0 {
        result.add_warning("output size limit 0 makes any file write fatal".to_string());
    }
}
