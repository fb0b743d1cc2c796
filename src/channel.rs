// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Component F: the public API. `Channel` is the one object an embedder
// holds — it owns the socket, the handler registry, the pending-request
// table, and the background receive thread, and exposes `send`/`request`/
// `reply`/`register`/`unregister`/`channel_init`/`primary_alive`.
//
// Unlike the ring-buffer channel this crate's layout is descended from,
// there is no producer/consumer split: the primary and every secondary are
// symmetric participants on one datagram socket, so one `Channel` both
// sends and receives.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::directory;
use crate::dispatcher;
use crate::env::{ChannelConfig, Role, RuntimeEnv};
use crate::error::{local_fault, timeout, Result, SendOutcome};
use crate::handler::Handler;
use crate::message::{check_input, Message};
use crate::pending::{PendingTable, WaitOutcome};
use crate::probe::{self, PrimaryLock};
use crate::registry::Registry;
use crate::socket::Endpoint;
use crate::wire::Tag;

pub struct Channel {
    endpoint: Arc<Endpoint>,
    registry: Arc<Registry>,
    pending: Arc<PendingTable>,
    env: Arc<dyn RuntimeEnv>,
    config: ChannelConfig,
    _primary_lock: Option<PrimaryLock>,
}

/// Aggregate result of a [`Channel::request`] call. Mirrors the historical
/// `nb_sent`/`nb_received` accounting exactly: `nb_sent` counts peers that
/// accepted the request and did not reply "not ready," `nb_received`
/// counts peers that sent back a real reply.
#[derive(Debug, Default)]
pub struct RequestReport {
    pub nb_sent: u32,
    pub nb_received: u32,
    pub replies: Vec<(PathBuf, Message)>,
}

struct OneResult {
    sent: bool,
    reply: Option<Message>,
    ignored: bool,
    timed_out: bool,
    error: Option<io::Error>,
}

/// Binds this process onto the channel, cleaning up stale peer sockets and
/// taking the liveness lock if this process is the primary, then starts
/// the background receive loop.
pub fn channel_init(config: ChannelConfig, env: Arc<dyn RuntimeEnv>) -> Result<Channel> {
    std::fs::create_dir_all(&config.socket_dir)?;
    let role = env.role();
    let dir = config.socket_dir.clone();
    let prefix = config.socket_prefix.clone();

    let endpoint = directory::with_dir_lock(&dir, || -> io::Result<Endpoint> {
        if role == Role::Primary {
            directory::unlink_stale_sockets(&dir, &prefix)?;
            Endpoint::bind_primary(&dir, &prefix)
        } else {
            Endpoint::bind_secondary(&dir, &prefix)
        }
    })??;

    let primary_lock = if role == Role::Primary {
        Some(probe::acquire_primary_lock(&config.primary_lock_path)?)
    } else {
        None
    };

    let endpoint = Arc::new(endpoint);
    let registry = Arc::new(Registry::new());
    let pending = Arc::new(PendingTable::new());

    dispatcher::spawn(endpoint.clone(), registry.clone(), pending.clone(), env.clone());

    Ok(Channel {
        endpoint,
        registry,
        pending,
        env,
        config,
        _primary_lock: primary_lock,
    })
}

/// Checks whether the process holding the primary's liveness lock is
/// still alive. Callable without a [`Channel`] — a secondary may want to
/// know this before even attempting `channel_init`.
pub fn primary_alive(config: &ChannelConfig) -> Result<bool> {
    probe::primary_alive(&config.primary_lock_path)
}

impl Channel {
    pub fn local_path(&self) -> &Path {
        self.endpoint.path()
    }

    pub fn register(&self, name: &str, handler: Handler) -> Result<()> {
        self.registry.register(name, handler)
    }

    pub fn unregister(&self, name: &str) {
        self.registry.unregister(name);
    }

    /// Sends a one-way message. `dest: None` means "the natural peer":
    /// the primary's socket for a secondary, or every other peer for the
    /// primary.
    pub fn send(&self, dest: Option<&Path>, msg: Message) -> Result<()> {
        check_input(&msg)?;
        match dest {
            Some(path) => self.send_one(path, &msg),
            None => match self.env.role() {
                Role::Secondary => {
                    let primary = self.config.primary_socket_path();
                    self.send_one(&primary, &msg)
                }
                Role::Primary => self.broadcast_send(&msg),
            },
        }
    }

    /// Sends a reply directly, without going through a handler's
    /// [`crate::handler::ReplyContext`]. Useful when a handler wants to
    /// answer asynchronously from another thread.
    pub fn reply(&self, dest: &Path, msg: Message) -> Result<()> {
        check_input(&msg)?;
        let is_primary = self.env.role() == Role::Primary;
        match self.endpoint.send(dest, Tag::Rep, &msg, is_primary) {
            SendOutcome::Sent => Ok(()),
            SendOutcome::RemoteFault => {
                log::debug!("peer {dest:?} vanished before the reply could be sent");
                Ok(())
            }
            SendOutcome::LocalFault(e) => Err(local_fault(e)),
        }
    }

    /// Sends a synchronous request and waits up to `timeout` for replies.
    /// A secondary requests the primary only; the primary broadcasts to
    /// every secondary and collects whatever replies arrive. The overall
    /// result is an error if any individual request hit a local fault or
    /// timed out, but every reachable peer is still attempted.
    pub fn request(&self, name: &str, param: Vec<u8>, timeout_dur: Duration) -> Result<RequestReport> {
        let msg = Message::with_param(name, param);
        check_input(&msg)?;

        match self.env.role() {
            Role::Secondary => {
                let primary = self.config.primary_socket_path();
                let mut report = RequestReport::default();
                let one = self.request_one(&primary, &msg, timeout_dur);
                self.apply_one(&primary, one, &mut report)?;
                Ok(report)
            }
            Role::Primary => {
                let dir = self.config.socket_dir.clone();
                let prefix = self.config.socket_prefix.clone();
                let own = self.endpoint.path().to_path_buf();
                let mut report = RequestReport::default();
                let mut first_failure: Option<io::Error> = None;

                directory::with_dir_lock(&dir, || -> io::Result<()> {
                    let peers = directory::list_peers(&dir, &prefix, Some(&own))?;
                    for peer in peers {
                        let one = self.request_one(&peer, &msg, timeout_dur);
                        if let Err(e) = self.apply_one(&peer, one, &mut report) {
                            log::warn!("request {name:?} to {peer:?} failed: {e}");
                            first_failure.get_or_insert(e);
                        }
                    }
                    Ok(())
                })??;

                match first_failure {
                    Some(e) => Err(e),
                    None => Ok(report),
                }
            }
        }
    }

    fn send_one(&self, dest: &Path, msg: &Message) -> Result<()> {
        let is_primary = self.env.role() == Role::Primary;
        match self.endpoint.send(dest, Tag::Msg, msg, is_primary) {
            SendOutcome::Sent | SendOutcome::RemoteFault => Ok(()),
            SendOutcome::LocalFault(e) => Err(local_fault(e)),
        }
    }

    fn broadcast_send(&self, msg: &Message) -> Result<()> {
        let dir = self.config.socket_dir.clone();
        let prefix = self.config.socket_prefix.clone();
        let own = self.endpoint.path().to_path_buf();
        // `broadcast_send` is only ever reached via the primary branch of
        // `send`, so every peer here is addressed as the primary.
        let is_primary = true;

        let outcome = directory::with_dir_lock(&dir, || -> Result<()> {
            let peers = directory::list_peers(&dir, &prefix, Some(&own))?;
            let mut first_failure = None;
            for peer in peers {
                match self.endpoint.send(&peer, Tag::Msg, msg, is_primary) {
                    SendOutcome::Sent | SendOutcome::RemoteFault => {}
                    SendOutcome::LocalFault(e) => {
                        log::warn!("broadcast send to {peer:?} failed: {e}");
                        first_failure.get_or_insert(e);
                    }
                }
            }
            match first_failure {
                Some(e) => Err(local_fault(e)),
                None => Ok(()),
            }
        })?;
        outcome
    }

    /// Runs one request/reply exchange against a single peer, per the
    /// historical seven-step algorithm: register the pending entry, send,
    /// wait, and always remove the entry afterward regardless of outcome.
    fn request_one(&self, dest: &Path, msg: &Message, timeout_dur: Duration) -> OneResult {
        let ticket = match self.pending.insert(dest.to_path_buf(), msg.name.clone()) {
            Ok(t) => t,
            Err(e) => {
                return OneResult {
                    sent: false,
                    reply: None,
                    ignored: false,
                    timed_out: false,
                    error: Some(e),
                }
            }
        };

        let is_primary = self.env.role() == Role::Primary;
        match self.endpoint.send(dest, Tag::Req, msg, is_primary) {
            SendOutcome::Sent => {}
            SendOutcome::RemoteFault => {
                self.pending.remove(&ticket);
                return OneResult {
                    sent: false,
                    reply: None,
                    ignored: false,
                    timed_out: false,
                    error: None,
                };
            }
            SendOutcome::LocalFault(e) => {
                self.pending.remove(&ticket);
                return OneResult {
                    sent: false,
                    reply: None,
                    ignored: false,
                    timed_out: false,
                    error: Some(local_fault(e)),
                };
            }
        }

        let outcome = self.pending.wait(&ticket, timeout_dur);
        self.pending.remove(&ticket);
        match outcome {
            WaitOutcome::Replied(m) => OneResult {
                sent: true,
                reply: Some(m),
                ignored: false,
                timed_out: false,
                error: None,
            },
            WaitOutcome::Ignored => OneResult {
                sent: true,
                reply: None,
                ignored: true,
                timed_out: false,
                error: None,
            },
            WaitOutcome::TimedOut => OneResult {
                sent: true,
                reply: None,
                ignored: false,
                timed_out: true,
                error: None,
            },
        }
    }

    /// Folds one peer's [`OneResult`] into the aggregate report, applying
    /// the `nb_sent++` then `nb_sent--`-on-ignore bookkeeping.
    fn apply_one(&self, peer: &Path, one: OneResult, report: &mut RequestReport) -> Result<()> {
        if let Some(e) = one.error {
            return Err(e);
        }
        if !one.sent {
            // Remote fault before the send even landed: zero replies
            // counted for this peer, not a failure of the whole request.
            return Ok(());
        }
        report.nb_sent += 1;
        if one.timed_out {
            return Err(timeout(format!("no reply from {peer:?}")));
        }
        if one.ignored {
            report.nb_sent -= 1;
            return Ok(());
        }
        if let Some(m) = one.reply {
            report.nb_received += 1;
            report.replies.push((peer.to_path_buf(), m));
        }
        Ok(())
    }
}
