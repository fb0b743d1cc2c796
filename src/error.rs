// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Error kind mapping for the public API. The crate reuses `std::io::Error`
// rather than introducing a derive-macro error type: every fallible public
// method already has a natural `io::ErrorKind`, and the one kind with no
// built-in equivalent (`duplicate`) maps cleanly onto `AlreadyExists`.

use std::io;

pub type Result<T> = io::Result<T>;

pub(crate) fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, msg.into())
}

pub(crate) fn too_big(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

pub(crate) fn duplicate(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::AlreadyExists, msg.into())
}

pub(crate) fn out_of_memory(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::OutOfMemory, msg.into())
}

pub(crate) fn timeout(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, msg.into())
}

pub(crate) fn local_fault(source: io::Error) -> io::Error {
    io::Error::new(io::ErrorKind::Other, source)
}

/// Outcome of a single datagram send, mirroring the three-way split the
/// channel needs internally: a genuine success, a fault attributable to the
/// peer (dead socket, full kernel buffer) that must not fail the caller's
/// overall operation, and a local fault that must.
#[derive(Debug)]
pub(crate) enum SendOutcome {
    Sent,
    RemoteFault,
    LocalFault(io::Error),
}
