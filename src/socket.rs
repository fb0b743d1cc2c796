// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Component A: the local datagram socket. Binds one `AF_UNIX`/`SOCK_DGRAM`
// endpoint, encodes/decodes one wire record per datagram, and carries file
// descriptors in the datagram's ancillary data. `std::os::unix::net::UnixDatagram`
// owns the bind/close lifecycle; raw `libc::sendmsg`/`recvmsg` calls (via
// `AsRawFd`) are used only for the `SCM_RIGHTS` exchange std has no API for.

use std::ffi::c_void;
use std::io;
use std::mem::size_of;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};
use std::ptr;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{invalid, local_fault, SendOutcome};
use crate::message::{Message, MAX_FD_NUM};
use crate::wire::{decode, encode, Decoded, Tag, RECORD_LEN};

pub struct Endpoint {
    sock: UnixDatagram,
    path: PathBuf,
}

impl Endpoint {
    /// Binds the primary's well-known socket at `<dir>/<prefix>`, removing
    /// a stale socket file left behind by a crashed previous primary.
    pub fn bind_primary(dir: &Path, prefix: &str) -> io::Result<Self> {
        let path = dir.join(prefix);
        Self::bind_at(path)
    }

    /// Binds a secondary's socket at `<dir>/<prefix>_<pid>_<unique>`, a name
    /// the peer directory's `<prefix>_*` filter matches.
    pub fn bind_secondary(dir: &Path, prefix: &str) -> io::Result<Self> {
        let pid = std::process::id();
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let path = dir.join(format!("{prefix}_{pid}_{unique:x}"));
        Self::bind_at(path)
    }

    fn bind_at(path: PathBuf) -> io::Result<Self> {
        let _ = std::fs::remove_file(&path);
        let sock = UnixDatagram::bind(&path)?;
        Ok(Self { sock, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sends one message to `dest`, classifying the outcome the way the
    /// broadcast/request callers need: a peer that is gone or backed up
    /// is a remote fault, never an error the caller must propagate. Only
    /// reaps the stale socket at `dest` when `is_primary` is set — a
    /// secondary has no business unlinking another peer's socket, and a
    /// dead primary should surface to its secondaries as a real fault
    /// rather than a silently swallowed zero-reply send.
    pub fn send(&self, dest: &Path, tag: Tag, msg: &Message, is_primary: bool) -> SendOutcome {
        let body = encode(tag, msg);
        let (addr, addr_len) = match sockaddr_un(dest) {
            Ok(v) => v,
            Err(e) => return SendOutcome::LocalFault(e),
        };

        let iov = libc::iovec {
            iov_base: body.as_ptr() as *mut c_void,
            iov_len: body.len(),
        };

        let fd_space = libc::CMSG_SPACE((msg.fds.len() * size_of::<RawFd>()) as u32);
        let mut cmsg_buf = vec![0u8; fd_space as usize];

        let mut msghdr: libc::msghdr = unsafe { std::mem::zeroed() };
        msghdr.msg_name = &addr as *const libc::sockaddr_un as *mut c_void;
        msghdr.msg_namelen = addr_len;
        msghdr.msg_iov = &iov as *const libc::iovec as *mut libc::iovec;
        msghdr.msg_iovlen = 1;

        if !msg.fds.is_empty() {
            msghdr.msg_control = cmsg_buf.as_mut_ptr() as *mut c_void;
            msghdr.msg_controllen = cmsg_buf.len();
            unsafe {
                let cmsg = libc::CMSG_FIRSTHDR(&msghdr);
                (*cmsg).cmsg_level = libc::SOL_SOCKET;
                (*cmsg).cmsg_type = libc::SCM_RIGHTS;
                (*cmsg).cmsg_len =
                    libc::CMSG_LEN((msg.fds.len() * size_of::<RawFd>()) as u32) as usize;
                let data = libc::CMSG_DATA(cmsg) as *mut RawFd;
                for (i, fd) in msg.fds.iter().enumerate() {
                    ptr::write_unaligned(data.add(i), fd.as_raw_fd());
                }
            }
        }

        loop {
            let ret = unsafe { libc::sendmsg(self.sock.as_raw_fd(), &msghdr, 0) };
            if ret >= 0 {
                return SendOutcome::Sent;
            }
            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EINTR) => continue,
                Some(libc::ECONNREFUSED) | Some(libc::ENOENT) => {
                    // Peer socket exists in the directory but nothing is
                    // listening, or has already vanished. Only the primary
                    // is responsible for reaping stale peer sockets; any
                    // other caller falls through to a local fault.
                    if is_primary {
                        let _ = std::fs::remove_file(dest);
                        return SendOutcome::RemoteFault;
                    }
                    return SendOutcome::LocalFault(err);
                }
                Some(libc::ENOBUFS) => return SendOutcome::RemoteFault,
                _ => return SendOutcome::LocalFault(err),
            }
        }
    }

    /// Blocks until one datagram arrives, returning the sender's socket
    /// path, the decoded record, and any file descriptors it carried.
    pub fn recv(&self) -> io::Result<(PathBuf, Decoded, Vec<OwnedFd>)> {
        let mut body = vec![0u8; RECORD_LEN];
        let mut addr: libc::sockaddr_un = unsafe { std::mem::zeroed() };
        let fd_space = libc::CMSG_SPACE((MAX_FD_NUM * size_of::<RawFd>()) as u32);
        let mut cmsg_buf = vec![0u8; fd_space as usize];

        let mut iov = libc::iovec {
            iov_base: body.as_mut_ptr() as *mut c_void,
            iov_len: body.len(),
        };

        let mut msghdr: libc::msghdr = unsafe { std::mem::zeroed() };
        msghdr.msg_name = &mut addr as *mut libc::sockaddr_un as *mut c_void;
        msghdr.msg_namelen = size_of::<libc::sockaddr_un>() as u32;
        msghdr.msg_iov = &mut iov as *mut libc::iovec;
        msghdr.msg_iovlen = 1;
        msghdr.msg_control = cmsg_buf.as_mut_ptr() as *mut c_void;
        msghdr.msg_controllen = cmsg_buf.len();

        let n = loop {
            let ret = unsafe { libc::recvmsg(self.sock.as_raw_fd(), &mut msghdr, 0) };
            if ret >= 0 {
                break ret as usize;
            }
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                continue;
            }
            return Err(local_fault(err));
        };

        if n != RECORD_LEN
            || msghdr.msg_flags & (libc::MSG_TRUNC | libc::MSG_CTRUNC) != 0
        {
            return Err(invalid(format!(
                "short or truncated datagram ({n} of {RECORD_LEN} bytes)"
            )));
        }

        let mut fds = Vec::new();
        unsafe {
            let mut cmsg = libc::CMSG_FIRSTHDR(&msghdr);
            while !cmsg.is_null() {
                if (*cmsg).cmsg_level == libc::SOL_SOCKET && (*cmsg).cmsg_type == libc::SCM_RIGHTS {
                    let data = libc::CMSG_DATA(cmsg) as *const RawFd;
                    let payload_len = (*cmsg).cmsg_len - libc::CMSG_LEN(0) as usize;
                    let count = payload_len / size_of::<RawFd>();
                    for i in 0..count {
                        let raw = ptr::read_unaligned(data.add(i));
                        fds.push(OwnedFd::from_raw_fd(raw));
                    }
                    break;
                }
                cmsg = libc::CMSG_NXTHDR(&msghdr, cmsg);
            }
        }

        let decoded = decode(&body)?;
        let src = sockaddr_un_to_path(&addr)?;
        Ok((src, decoded, fds))
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

fn sockaddr_un(path: &Path) -> io::Result<(libc::sockaddr_un, u32)> {
    let bytes = path.as_os_str().as_bytes();
    if bytes.len() >= 108 {
        return Err(invalid(format!(
            "socket path {path:?} exceeds sun_path capacity"
        )));
    }
    let mut addr: libc::sockaddr_un = unsafe { std::mem::zeroed() };
    addr.sun_family = libc::AF_UNIX as libc::sa_family_t;
    for (i, &b) in bytes.iter().enumerate() {
        addr.sun_path[i] = b as libc::c_char;
    }
    let len = (size_of::<libc::sa_family_t>() + bytes.len() + 1) as u32;
    Ok((addr, len))
}

fn sockaddr_un_to_path(addr: &libc::sockaddr_un) -> io::Result<PathBuf> {
    let raw = unsafe { &*(addr.sun_path.as_ptr() as *const [u8; 108]) };
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    let s = std::str::from_utf8(&raw[..end])
        .map_err(|e| invalid(format!("peer socket path is not valid UTF-8: {e}")))?;
    Ok(PathBuf::from(s))
}
