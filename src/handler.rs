// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// A registered handler is handed the inbound message and a reply capability
// bound to the sender's address, rather than returning a reply value
// directly: a `Msg`-tagged datagram has no reply slot at all, and a `Req`
// may legitimately choose not to answer (the requester then times out), so
// "call back if you want to" is the more honest shape than "return
// Option<Message>".

use std::path::Path;

use crate::error::Result;
use crate::message::Message;

pub trait ReplyContext {
    /// Socket path of the peer that sent the message being handled.
    fn source(&self) -> &Path;

    /// Sends `msg` back to the source as a reply. Only meaningful when the
    /// inbound message was a request; calling it for a one-way message is
    /// harmless but has no requester waiting on the other end.
    fn reply(&self, msg: Message) -> Result<()>;
}

/// A negative/`Err` return is logged by the dispatcher; no reply is
/// synthesised on the handler's behalf either way.
pub type Handler = std::sync::Arc<dyn Fn(&Message, &dyn ReplyContext) -> Result<()> + Send + Sync>;
