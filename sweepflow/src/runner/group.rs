//! Process-group signalling.
//!
//! Implementations are spawned as leaders of their own process group so a
//! timeout can reach every descendant (browser helpers and the like), not
//! just the immediate child.

#![allow(unsafe_code)]

use std::io;

/// Signal sent to a process group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupSignal {
    /// Ask the group to exit (SIGTERM).
    Terminate,
    /// Force the group to exit (SIGKILL).
    Kill,
}

/// Sends `signal` to every process in group `pgid`.
///
/// A group that no longer exists is not an error.
#[cfg(unix)]
pub fn signal_group(pgid: u32, signal: GroupSignal) -> io::Result<()> {
    let pgid = checked_pgid(pgid)?;
    let signo = match signal {
        GroupSignal::Terminate => libc::SIGTERM,
        GroupSignal::Kill => libc::SIGKILL,
    };
    // SAFETY: killpg only takes integers; pgid is never 0 or 1.
    let ret = unsafe { libc::killpg(pgid, signo) };
    if ret == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        Ok(())
    } else {
        Err(err)
    }
}

#[cfg(unix)]
fn checked_pgid(pgid: u32) -> io::Result<libc::pid_t> {
    match libc::pid_t::try_from(pgid) {
        Ok(pgid) if pgid > 1 => Ok(pgid),
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("refusing to signal process group {pgid}"),
        )),
    }
}

/// Process groups are a Unix concept; elsewhere only the child is killed.
#[cfg(not(unix))]
pub fn signal_group(_pgid: u32, _signal: GroupSignal) -> io::Result<()> {
    Ok(())
}
