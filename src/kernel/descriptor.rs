/// Descriptor flag handling for the report channel
///
/// The report channel is inherited from the caller at a fixed number. It must
/// carry `FD_CLOEXEC` before fork so the target image never sees it.
use crate::config::types::{Result, SupervisorError};
use nix::fcntl::{fcntl, FcntlArg, FdFlag, OFlag};
use std::os::unix::io::RawFd;

/// Read the descriptor flags; fails with `EBADF` when `fd` is not open.
pub fn descriptor_flags(fd: RawFd) -> nix::Result<FdFlag> {
    let raw = fcntl(fd, FcntlArg::F_GETFD)?;
    Ok(FdFlag::from_bits_truncate(raw))
}

/// True when the open file description allows writing (`O_WRONLY` or `O_RDWR`).
pub fn is_writable(fd: RawFd) -> nix::Result<bool> {
    let status = OFlag::from_bits_truncate(fcntl(fd, FcntlArg::F_GETFL)?);
    let mode = status & OFlag::O_ACCMODE;
    Ok(mode == OFlag::O_WRONLY || mode == OFlag::O_RDWR)
}

pub fn is_close_on_exec(fd: RawFd) -> nix::Result<bool> {
    Ok(descriptor_flags(fd)?.contains(FdFlag::FD_CLOEXEC))
}

/// Mark `fd` close-on-exec, keeping any other descriptor flags, and verify it stuck.
pub fn mark_close_on_exec(fd: RawFd) -> Result<()> {
    let flags = descriptor_flags(fd).map_err(|e| {
        SupervisorError::ChannelHygiene(format!("F_GETFD on fd {} failed: {}", fd, e))
    })?;

    fcntl(fd, FcntlArg::F_SETFD(flags | FdFlag::FD_CLOEXEC)).map_err(|e| {
        SupervisorError::ChannelHygiene(format!("F_SETFD on fd {} failed: {}", fd, e))
    })?;

    match is_close_on_exec(fd) {
        Ok(true) => {
            log::debug!("Report fd {} marked close-on-exec", fd);
            Ok(())
        }
        Ok(false) => Err(SupervisorError::ChannelHygiene(format!(
            "fd {} still inheritable after F_SETFD",
            fd
        ))),
        Err(e) => Err(SupervisorError::ChannelHygiene(format!(
            "F_GETFD on fd {} failed after marking: {}",
            fd, e
        ))),
    }
}

/// Clear `FD_CLOEXEC` so `fd` survives exec.
///
/// Only calls `fcntl`, so it is safe inside a `pre_exec` hook.
pub fn clear_close_on_exec(fd: RawFd) -> nix::Result<()> {
    let flags = descriptor_flags(fd)?;
    fcntl(fd, FcntlArg::F_SETFD(flags.difference(FdFlag::FD_CLOEXEC)))?;
    Ok(())
}
