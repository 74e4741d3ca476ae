//! The global commit lock.

use std::fs::File;
use std::os::fd::AsRawFd as _;

use anyhow::{Context as _, Result};
use camino::Utf8Path;
use nix::fcntl::{flock, FlockArg};

/// Holds the advisory lock serializing commits across the host. The lock
/// is released when the guard drops (including on abnormal process
/// termination, since the kernel drops it with the descriptor).
#[derive(Debug)]
pub struct CommitLock {
    _file: File,
}

impl CommitLock {
    /// Tries to take the lock; `None` when another commit holds it.
    pub fn acquire(path: &Utf8Path) -> Result<Option<CommitLock>> {
        let file = File::options()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("failed to open lock file {path}"))?;
        match flock(file.as_raw_fd(), FlockArg::LockExclusiveNonblock) {
            Ok(()) => Ok(Some(CommitLock { _file: file })),
            Err(nix::errno::Errno::EWOULDBLOCK) => Ok(None),
            Err(e) => Err(e).with_context(|| format!("failed to lock {path}")),
        }
    }
}
