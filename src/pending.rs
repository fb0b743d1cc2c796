// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Component D: the pending-request table. Keyed by (destination socket,
// request name), one entry per outstanding synchronous request. Each entry
// owns its own condition variable — the re-architecture the historical
// design called for, replacing one intrusive list walked under one global
// lock with a map lookup plus a single-shot per-request wait, so one slow
// reply cannot block any other request from being registered or answered.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::error::{duplicate, Result};
use crate::message::Message;

pub type Key = (PathBuf, String);

enum SlotState {
    Waiting,
    Replied(Message),
    Ignored,
}

struct Slot {
    state: Mutex<SlotState>,
    cond: Condvar,
}

impl Slot {
    fn new() -> Self {
        Self {
            state: Mutex::new(SlotState::Waiting),
            cond: Condvar::new(),
        }
    }

    fn wait(&self, timeout: Duration) -> WaitOutcome {
        let guard = self.state.lock().unwrap();
        let (mut guard, _result) = self
            .cond
            .wait_timeout_while(guard, timeout, |s| matches!(s, SlotState::Waiting))
            .unwrap();
        match std::mem::replace(&mut *guard, SlotState::Waiting) {
            SlotState::Waiting => WaitOutcome::TimedOut,
            SlotState::Replied(m) => WaitOutcome::Replied(m),
            SlotState::Ignored => WaitOutcome::Ignored,
        }
    }
}

pub enum WaitOutcome {
    Replied(Message),
    Ignored,
    TimedOut,
}

#[derive(Default)]
pub struct PendingTable {
    slots: Mutex<HashMap<Key, Arc<Slot>>>,
}

/// A handle to one outstanding request. Dropping it without calling
/// [`PendingTable::remove`] would leak the map entry, so `request_one`
/// always removes it itself once the wait finishes, success or not.
pub struct Ticket {
    key: Key,
    slot: Arc<Slot>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new outstanding request. Fails if a request with the
    /// same (destination, name) key is already outstanding.
    pub fn insert(&self, dest: PathBuf, name: String) -> Result<Ticket> {
        let key = (dest, name);
        let mut slots = self.slots.lock().unwrap();
        if slots.contains_key(&key) {
            return Err(duplicate(format!(
                "a request named {:?} to {:?} is already outstanding",
                key.1, key.0
            )));
        }
        let slot = Arc::new(Slot::new());
        slots.insert(key.clone(), slot.clone());
        Ok(Ticket { key, slot })
    }

    pub fn remove(&self, ticket: &Ticket) {
        self.slots.lock().unwrap().remove(&ticket.key);
    }

    pub fn wait(&self, ticket: &Ticket, timeout: Duration) -> WaitOutcome {
        ticket.slot.wait(timeout)
    }

    /// Delivers a reply (or the distinguished "ignore me" response) to the
    /// matching outstanding request, if there is one. Returns `false` when
    /// no entry matches — a reply arriving after its requester already
    /// timed out and removed the entry, which is dropped on the floor by
    /// the caller, not treated as an error.
    pub fn complete(&self, dest: &Path, name: &str, reply: Option<Message>) -> bool {
        let key = (dest.to_path_buf(), name.to_owned());
        let slots = self.slots.lock().unwrap();
        if let Some(slot) = slots.get(&key) {
            let mut state = slot.state.lock().unwrap();
            *state = match reply {
                Some(m) => SlotState::Replied(m),
                None => SlotState::Ignored,
            };
            slot.cond.notify_all();
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn duplicate_key_is_rejected() {
        let table = PendingTable::new();
        let _t1 = table.insert(PathBuf::from("/tmp/a"), "ping".into()).unwrap();
        let err = table
            .insert(PathBuf::from("/tmp/a"), "ping".into())
            .unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::AlreadyExists);
    }

    #[test]
    fn complete_before_wait_is_observed_immediately() {
        let table = PendingTable::new();
        let ticket = table.insert(PathBuf::from("/tmp/a"), "ping".into()).unwrap();
        assert!(table.complete(Path::new("/tmp/a"), "ping", Some(Message::new("pong"))));
        match table.wait(&ticket, Duration::from_millis(50)) {
            WaitOutcome::Replied(m) => assert_eq!(m.name, "pong"),
            _ => panic!("expected a reply"),
        }
        table.remove(&ticket);
    }

    #[test]
    fn wait_times_out_with_no_reply() {
        let table = PendingTable::new();
        let ticket = table.insert(PathBuf::from("/tmp/a"), "ping".into()).unwrap();
        match table.wait(&ticket, Duration::from_millis(20)) {
            WaitOutcome::TimedOut => {}
            _ => panic!("expected a timeout"),
        }
        table.remove(&ticket);
    }

    #[test]
    fn complete_after_removal_is_a_no_op() {
        let table = PendingTable::new();
        let ticket = table.insert(PathBuf::from("/tmp/a"), "ping".into()).unwrap();
        table.remove(&ticket);
        assert!(!table.complete(Path::new("/tmp/a"), "ping", Some(Message::new("late"))));
    }
}
