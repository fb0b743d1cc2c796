// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Component E: the receive loop and dispatcher. One long-lived thread per
// channel reads datagrams forever and routes each one by tag: replies and
// ignore-responses complete an outstanding request (component D);
// messages and requests with no matching handler either get a not-ready
// reply or are logged and dropped, per the not-ready handshake below.
//
// The loop never holds the registry lock while a handler runs — `Registry::lookup`
// clones the handler `Arc` out and releases the lock before the call.

use std::os::fd::OwnedFd;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::env::{Role, RuntimeEnv};
use crate::error::{local_fault, SendOutcome};
use crate::handler::ReplyContext;
use crate::message::Message;
use crate::pending::PendingTable;
use crate::registry::Registry;
use crate::socket::Endpoint;
use crate::wire::{Decoded, Tag};

pub fn spawn(
    endpoint: Arc<Endpoint>,
    registry: Arc<Registry>,
    pending: Arc<PendingTable>,
    env: Arc<dyn RuntimeEnv>,
) {
    std::thread::Builder::new()
        .name("mp-recv-loop".into())
        .spawn(move || loop {
            match endpoint.recv() {
                Ok((src, decoded, fds)) => {
                    process_datagram(&endpoint, &registry, &pending, env.as_ref(), src, decoded, fds)
                }
                Err(e) => {
                    log::debug!("receive error on multi-process channel: {e}");
                }
            }
        })
        .expect("failed to spawn mp-recv-loop thread");
}

fn process_datagram(
    endpoint: &Endpoint,
    registry: &Registry,
    pending: &PendingTable,
    env: &dyn RuntimeEnv,
    src: PathBuf,
    decoded: Decoded,
    fds: Vec<OwnedFd>,
) {
    match decoded.tag {
        Tag::Rep => {
            let msg = Message {
                name: decoded.name.clone(),
                param: decoded.param,
                fds,
            };
            if !pending.complete(&src, &decoded.name, Some(msg)) {
                log::debug!("dropped late reply {:?} from {src:?}", decoded.name);
            }
        }
        Tag::Ign => {
            if !pending.complete(&src, &decoded.name, None) {
                log::debug!(
                    "dropped late ignore-response {:?} from {src:?}",
                    decoded.name
                );
            }
        }
        Tag::Msg | Tag::Req => {
            let msg = Message {
                name: decoded.name.clone(),
                param: decoded.param,
                fds,
            };
            match registry.lookup(&msg.name) {
                Some(handler) => {
                    let ctx = DispatchContext {
                        endpoint,
                        source: src,
                        is_primary: env.role() == Role::Primary,
                    };
                    if let Err(e) = handler(&msg, &ctx) {
                        log::warn!("handler for {:?} returned an error: {e}", msg.name);
                    }
                }
                None => {
                    if decoded.tag == Tag::Req && !env.init_complete() {
                        let dummy = Message::new("");
                        let is_primary = env.role() == Role::Primary;
                        match endpoint.send(&src, Tag::Ign, &dummy, is_primary) {
                            SendOutcome::Sent => {}
                            SendOutcome::RemoteFault => log::debug!(
                                "peer {src:?} vanished before an ignore-reply could be sent"
                            ),
                            SendOutcome::LocalFault(e) => log::warn!(
                                "failed to send ignore-reply to {src:?}: {e}"
                            ),
                        }
                    } else {
                        log::debug!("no handler registered for {:?}", msg.name);
                    }
                }
            }
        }
    }
}

struct DispatchContext<'a> {
    endpoint: &'a Endpoint,
    source: PathBuf,
    is_primary: bool,
}

impl ReplyContext for DispatchContext<'_> {
    fn source(&self) -> &Path {
        &self.source
    }

    fn reply(&self, msg: Message) -> crate::error::Result<()> {
        crate::message::check_input(&msg)?;
        match self.endpoint.send(&self.source, Tag::Rep, &msg, self.is_primary) {
            SendOutcome::Sent => Ok(()),
            SendOutcome::RemoteFault => {
                log::debug!("peer {:?} vanished before the reply could be sent", self.source);
                Ok(())
            }
            SendOutcome::LocalFault(e) => Err(local_fault(e)),
        }
    }
}
