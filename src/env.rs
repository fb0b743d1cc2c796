// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// External collaborators the core channel consumes but does not implement:
// process-role detection and the handful of runtime knobs DPDK's EAL would
// otherwise own (socket directory, primary socket name, init-complete
// flag). An embedder supplies a `RuntimeEnv` implementation; this crate
// never decides on its own whether it is "the primary."

use std::path::PathBuf;

/// Which role this process plays in the channel. Exactly one process
/// across the whole peer set should report `Primary`; the channel does not
/// verify this, since enforcing it requires coordination outside the
/// channel's own scope (an external election/role oracle).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Primary,
    Secondary,
}

/// Runtime knobs supplied by the embedder.
pub trait RuntimeEnv: Send + Sync {
    fn role(&self) -> Role;

    /// Whether this process has finished its own startup. While `false`,
    /// inbound requests for which no handler is registered get a
    /// not-ready ("ignore me") reply instead of being silently dropped.
    fn init_complete(&self) -> bool;
}

/// A `RuntimeEnv` backed by a fixed role and an `AtomicBool`-like flag
/// supplied as a closure, for embedders that don't need anything fancier.
pub struct StaticEnv<F> {
    role: Role,
    init_complete: F,
}

impl<F> StaticEnv<F>
where
    F: Fn() -> bool + Send + Sync,
{
    pub fn new(role: Role, init_complete: F) -> Self {
        Self { role, init_complete }
    }
}

impl<F> RuntimeEnv for StaticEnv<F>
where
    F: Fn() -> bool + Send + Sync,
{
    fn role(&self) -> Role {
        self.role
    }

    fn init_complete(&self) -> bool {
        (self.init_complete)()
    }
}

/// Filesystem configuration for one channel instance. Kept as a plain
/// struct rather than folded into `RuntimeEnv` because it rarely changes
/// at runtime and every test needs a fresh one pointed at a scratch
/// directory.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Directory all peer sockets live in.
    pub socket_dir: PathBuf,
    /// Filename prefix shared by every peer socket (`<prefix>_<suffix>`);
    /// the primary binds exactly `<prefix>`.
    pub socket_prefix: String,
    /// Path to a lock file the primary holds exclusively for the lifetime
    /// of the process, probed by [`crate::probe::primary_alive`].
    pub primary_lock_path: PathBuf,
}

impl ChannelConfig {
    pub fn primary_socket_path(&self) -> PathBuf {
        self.socket_dir.join(&self.socket_prefix)
    }
}
