// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Fixed-size wire record: this is what actually travels inside one
// SOCK_DGRAM datagram's iovec. File descriptors never appear in this byte
// buffer — they ride along in the datagram's ancillary (SCM_RIGHTS) data,
// which `socket.rs` attaches and strips independently of this encoding.
//
// The record has one shape regardless of content, so it is built with plain
// offset writes rather than a `#[repr(C)]` struct: there is no in-place
// mutation to support here, only "turn a Message into bytes" and back.

use crate::error::{invalid, too_big, Result};
use crate::message::{Message, MAX_NAME_LEN, MAX_PARAM_LEN};

/// Wire tag. Values are assignment-defined and must stay stable across
/// versions of this crate: a peer built against a different minor version
/// still needs to agree on what `2` means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Tag {
    Msg = 1,
    Req = 2,
    Rep = 3,
    Ign = 4,
}

impl Tag {
    fn from_i32(v: i32) -> Option<Tag> {
        match v {
            1 => Some(Tag::Msg),
            2 => Some(Tag::Req),
            3 => Some(Tag::Rep),
            4 => Some(Tag::Ign),
            _ => None,
        }
    }
}

const TAG_LEN: usize = 4;
const NAME_OFF: usize = TAG_LEN;
const LEN_PARAM_OFF: usize = NAME_OFF + MAX_NAME_LEN;
const PARAM_OFF: usize = LEN_PARAM_OFF + 4;
const NUM_FDS_OFF: usize = PARAM_OFF + MAX_PARAM_LEN;

/// Total size of the encoded record, excluding ancillary FD data. This is
/// the exact byte count the socket endpoint expects to read per datagram.
pub const RECORD_LEN: usize = NUM_FDS_OFF + 4;

pub fn encode(tag: Tag, msg: &Message) -> Vec<u8> {
    let mut buf = vec![0u8; RECORD_LEN];
    buf[0..TAG_LEN].copy_from_slice(&(tag as i32).to_le_bytes());

    let name_bytes = msg.name.as_bytes();
    buf[NAME_OFF..NAME_OFF + name_bytes.len()].copy_from_slice(name_bytes);

    let len_param = msg.param.len() as u32;
    buf[LEN_PARAM_OFF..LEN_PARAM_OFF + 4].copy_from_slice(&len_param.to_le_bytes());

    buf[PARAM_OFF..PARAM_OFF + msg.param.len()].copy_from_slice(&msg.param);

    let num_fds = msg.fds.len() as u32;
    buf[NUM_FDS_OFF..NUM_FDS_OFF + 4].copy_from_slice(&num_fds.to_le_bytes());

    buf
}

/// A record with FDs decoded separately from the byte body: `fd_count` is
/// read from the wire so the socket layer knows how many ancillary
/// descriptors to expect, but the descriptors themselves are attached by
/// the caller after `recvmsg` returns.
pub struct Decoded {
    pub tag: Tag,
    pub name: String,
    pub param: Vec<u8>,
    pub fd_count: usize,
}

pub fn decode(buf: &[u8]) -> Result<Decoded> {
    if buf.len() != RECORD_LEN {
        return Err(invalid(format!(
            "record length {} does not match expected {RECORD_LEN}",
            buf.len()
        )));
    }

    let tag_raw = i32::from_le_bytes(buf[0..TAG_LEN].try_into().unwrap());
    let tag = Tag::from_i32(tag_raw).ok_or_else(|| invalid(format!("unknown tag {tag_raw}")))?;

    let name_field = &buf[NAME_OFF..NAME_OFF + MAX_NAME_LEN];
    let name_end = name_field.iter().position(|&b| b == 0).unwrap_or(name_field.len());
    let name = std::str::from_utf8(&name_field[..name_end])
        .map_err(|e| invalid(format!("name is not valid UTF-8: {e}")))?
        .to_owned();

    let len_param = u32::from_le_bytes(buf[LEN_PARAM_OFF..LEN_PARAM_OFF + 4].try_into().unwrap())
        as usize;
    if len_param > MAX_PARAM_LEN {
        return Err(too_big(format!(
            "wire len_param {len_param} exceeds {MAX_PARAM_LEN}"
        )));
    }
    let param = buf[PARAM_OFF..PARAM_OFF + len_param].to_vec();

    let num_fds =
        u32::from_le_bytes(buf[NUM_FDS_OFF..NUM_FDS_OFF + 4].try_into().unwrap()) as usize;

    Ok(Decoded {
        tag,
        name,
        param,
        fd_count: num_fds,
    })
}
