//! Opcode → handler dispatch.
//!
//! One handler slot per [`Opcode`]. Frames are dispatched synchronously on
//! the caller's thread, so arrival order on the socket is dispatch order.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use onechat_shared::{Opcode, SocketFrame};
use serde::de::DeserializeOwned;
use serde_json::Value;

pub type Handler = dyn Fn(Value) -> anyhow::Result<()> + Send + Sync;

/// What happened to a single inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Handled(Opcode),
    /// Known opcode, nothing registered for it.
    NoHandler(Opcode),
    UnknownOpcode(String),
    /// The handler returned an error or panicked.
    Failed(Opcode),
    Malformed,
}

#[derive(Default)]
pub struct EventRouter {
    handlers: RwLock<HashMap<Opcode, Arc<Handler>>>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `handler` for `op`, replacing any previous one.
    pub fn register_event<F>(&self, op: Opcode, handler: F)
    where
        F: Fn(Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let previous = self
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(op, Arc::new(handler));
        if previous.is_some() {
            crate::log_debug!("Replaced handler for {}", op);
        }
    }

    /// Like [`register_event`](Self::register_event), decoding `d` into `T` first.
    pub fn register_typed<T, F>(&self, op: Opcode, handler: F)
    where
        T: DeserializeOwned,
        F: Fn(T) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register_event(op, move |d| {
            let payload: T = serde_json::from_value(d)
                .map_err(|e| anyhow::anyhow!("invalid {} payload: {}", op, e))?;
            handler(payload)
        });
    }

    pub fn remove_event(&self, op: Opcode) -> bool {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&op)
            .is_some()
    }

    pub fn has_handler(&self, op: Opcode) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&op)
    }

    pub fn clear(&self) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Parse a raw text frame and dispatch it. Malformed frames are dropped.
    pub fn dispatch_text(&self, text: &str) -> DispatchOutcome {
        match SocketFrame::parse(text) {
            Ok(frame) => self.dispatch(frame),
            Err(e) => {
                crate::log_debug!("Dropping malformed frame: {}", e);
                DispatchOutcome::Malformed
            }
        }
    }

    pub fn dispatch(&self, frame: SocketFrame) -> DispatchOutcome {
        let op = match frame.opcode() {
            Ok(op) => op,
            Err(e) => {
                crate::log_warn!("{}", e);
                return DispatchOutcome::UnknownOpcode(frame.op);
            }
        };

        // Clone the slot out so a handler may (re)register without deadlocking.
        let handler = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&op)
            .cloned();
        let Some(handler) = handler else {
            crate::log_debug!("No handler registered for {}", op);
            return DispatchOutcome::NoHandler(op);
        };

        match catch_unwind(AssertUnwindSafe(|| handler(frame.d))) {
            Ok(Ok(())) => DispatchOutcome::Handled(op),
            Ok(Err(e)) => {
                crate::log_error!("Handler for {} failed: {:#}", op, e);
                DispatchOutcome::Failed(op)
            }
            Err(_) => {
                crate::log_error!("Handler for {} panicked", op);
                DispatchOutcome::Failed(op)
            }
        }
    }
}
