// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Primary-liveness probe. This is a pure process-liveness test, not a
// channel message: the primary holds an exclusive `lockf` on a well-known
// file for its entire lifetime, and anyone can check whether that lock is
// still held without sending anything over the socket.

use std::fs::OpenOptions;
use std::io;
use std::os::fd::AsRawFd;
use std::path::Path;

/// Returns `true` if the process holding the exclusive lock on
/// `lock_path` is still alive. A missing lock file is treated as "no
/// primary is running," not an error.
pub fn primary_alive(lock_path: &Path) -> io::Result<bool> {
    let file = match OpenOptions::new().read(true).write(true).open(lock_path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    let rc = unsafe { libc::lockf(file.as_raw_fd(), libc::F_TEST, 0) };
    if rc == 0 {
        // We could have taken the lock ourselves, meaning nobody holds it.
        Ok(false)
    } else {
        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EACCES) | Some(libc::EAGAIN) => Ok(true),
            _ => Err(err),
        }
    }
}

/// Acquires and holds the primary's liveness lock for the lifetime of the
/// returned guard. The primary calls this once at startup; dropping the
/// guard (normally only at process exit) releases the lock.
pub struct PrimaryLock {
    _file: std::fs::File,
}

pub fn acquire_primary_lock(lock_path: &Path) -> io::Result<PrimaryLock> {
    if let Some(parent) = lock_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path)?;
    let rc = unsafe { libc::lockf(file.as_raw_fd(), libc::F_TLOCK, 0) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(PrimaryLock { _file: file })
}
