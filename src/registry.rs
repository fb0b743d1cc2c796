// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Component C: the handler registry. A name maps to at most one handler;
// handlers are invoked by the dispatcher with the registry's own lock
// already released, so a handler is free to register or unregister another
// name without deadlocking itself.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{duplicate, out_of_memory, Result};
use crate::handler::Handler;
use crate::message::validate_name;

#[derive(Default)]
pub struct Registry {
    handlers: Mutex<HashMap<String, Handler>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: &str, handler: Handler) -> Result<()> {
        validate_name(name)?;
        let mut handlers = self.handlers.lock().unwrap();
        if handlers.contains_key(name) {
            return Err(duplicate(format!("handler {name:?} already registered")));
        }
        handlers
            .try_reserve(1)
            .map_err(|e| out_of_memory(e.to_string()))?;
        handlers.insert(name.to_owned(), handler);
        Ok(())
    }

    pub fn unregister(&self, name: &str) {
        self.handlers.lock().unwrap().remove(name);
    }

    /// Looks up `name` and clones the `Arc` out, so the caller can invoke
    /// the handler without holding the registry lock.
    pub fn lookup(&self, name: &str) -> Option<Handler> {
        self.handlers.lock().unwrap().get(name).cloned()
    }
}
