// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Component B: the peer directory. Peers are discovered by listing
// `<dir>/<prefix>_*` entries; a directory-wide `flock(LOCK_EX)` serializes
// fan-out sends/requests against a peer joining or leaving mid-broadcast.

use std::fs::File;
use std::io;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

/// Lists every peer socket path matching `<prefix>_*`, excluding `exclude`
/// (normally the caller's own socket, which also lives in this directory).
pub fn list_peers(dir: &Path, prefix: &str, exclude: Option<&Path>) -> io::Result<Vec<PathBuf>> {
    let needle = format!("{prefix}_");
    let mut peers = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !name.starts_with(&needle) {
            continue;
        }
        let path = entry.path();
        if Some(path.as_path()) == exclude {
            continue;
        }
        peers.push(path);
    }
    Ok(peers)
}

/// Removes every `<prefix>_*` socket file in `dir`. Only the primary calls
/// this, at startup, to reap sockets a prior primary's secondaries left
/// behind.
pub fn unlink_stale_sockets(dir: &Path, prefix: &str) -> io::Result<()> {
    for path in list_peers(dir, prefix, None)? {
        let _ = std::fs::remove_file(path);
    }
    Ok(())
}

/// Holds an exclusive `flock` on `dir` for the duration of `f`. Any
/// operation that walks the peer list (broadcast send, broadcast request,
/// primary startup cleanup) must run inside this lock so a peer cannot
/// join or leave mid-enumeration.
pub fn with_dir_lock<T>(dir: &Path, f: impl FnOnce() -> T) -> io::Result<T> {
    let dir_file = File::open(dir)?;
    let fd = dir_file.as_raw_fd();
    let rc = unsafe { libc::flock(fd, libc::LOCK_EX) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    let result = f();
    unsafe {
        libc::flock(fd, libc::LOCK_UN);
    }
    Ok(result)
}
