// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Intra-host multi-process message channel: peer discovery over a shared
// socket directory, named message/request dispatch, and file-descriptor
// passing, all on top of AF_UNIX SOCK_DGRAM sockets.

mod channel;
mod directory;
mod dispatcher;
mod env;
mod error;
mod handler;
mod message;
mod pending;
mod probe;
mod registry;
mod socket;
mod wire;

pub use channel::{channel_init, primary_alive, Channel, RequestReport};
pub use env::{ChannelConfig, Role, RuntimeEnv, StaticEnv};
pub use error::Result;
pub use handler::{Handler, ReplyContext};
pub use message::{check_input, Message, MAX_FD_NUM, MAX_NAME_LEN, MAX_PARAM_LEN};
pub use wire::Tag;
