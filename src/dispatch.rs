//! Event routing: registry of handlers keyed by event name, and the
//! dispatcher that maps a parsed event to at most one of them.
//!
//! Candidate keys are derived from the event payload in strict precedence
//! order: the nested `subEvent` discriminator, then the nested payload
//! `type`, then the reserved [`MESSAGE_KEY`] when both discriminators say
//! "message", then the [`UNKNOWN_KEY`] fallback. The first registered
//! handler found in that order runs; never more than one per event.

use crate::sse::StreamEvent;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::warn;

/// Reserved key for text messages (`subEvent` and payload type both
/// "message").
pub const MESSAGE_KEY: &str = "message";

/// Reserved fallback key for events no specific handler matched.
pub const UNKNOWN_KEY: &str = "unknown";

pub type Handler = Box<dyn Fn(&StreamEvent) -> anyhow::Result<()> + Send + Sync>;

/// Returned by [`HandlerRegistry::register`] for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, (HandlerId, Handler)>,
    next_id: u64,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `handler` under `key`. Keys are unique; a later registration
    /// for the same key replaces the earlier one.
    pub fn register<F>(&mut self, key: impl Into<String>, handler: F) -> HandlerId
    where
        F: Fn(&StreamEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = HandlerId(self.next_id);
        self.next_id += 1;
        self.handlers.insert(key.into(), (id, Box::new(handler)));
        id
    }

    /// Removes the handler registered under `id`. Returns whether anything
    /// was removed; a stale id (already replaced or removed) is a no-op.
    pub fn remove(&mut self, id: HandlerId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|_, (existing, _)| *existing != id);
        self.handlers.len() != before
    }

    pub fn contains(&self, key: &str) -> bool {
        self.handlers.contains_key(key)
    }

    fn get(&self, key: &str) -> Option<&Handler> {
        self.handlers.get(key).map(|(_, handler)| handler)
    }
}

/// A handler that returned an error; the stream itself is unaffected.
#[derive(Debug)]
pub struct HandlerFailure {
    pub key: String,
    pub message: String,
}

pub struct EventDispatcher {
    registry: HandlerRegistry,
    failure_tx: Option<mpsc::UnboundedSender<HandlerFailure>>,
}

impl EventDispatcher {
    pub fn new(registry: HandlerRegistry) -> Self {
        Self {
            registry,
            failure_tx: None,
        }
    }

    /// Subscribes to handler failures. Failures are always logged; this
    /// channel additionally surfaces them to the caller.
    pub fn failure_channel(&mut self) -> mpsc::UnboundedReceiver<HandlerFailure> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.failure_tx = Some(tx);
        rx
    }

    /// Routes `event` to the first matching handler, if any. Handler errors
    /// are reported and swallowed so dispatch of later events continues.
    pub fn dispatch(&self, event: &StreamEvent) {
        for key in candidate_keys(event) {
            let Some(handler) = self.registry.get(&key) else {
                continue;
            };
            if let Err(err) = handler(event) {
                warn!(key = %key, "event handler failed: {err:#}");
                if let Some(tx) = &self.failure_tx {
                    let _ = tx.send(HandlerFailure {
                        key: key.clone(),
                        message: format!("{err:#}"),
                    });
                }
            }
            return;
        }
    }
}

/// Candidate keys for `event`, most specific first.
fn candidate_keys(event: &StreamEvent) -> Vec<String> {
    let payload = event.payload.as_json();
    let sub_event = payload
        .and_then(|p| p.get("subEvent"))
        .and_then(Value::as_str);
    let payload_type = payload
        .and_then(|p| p.get("payload"))
        .and_then(|inner| inner.get("type"))
        .and_then(Value::as_str);

    let mut keys = Vec::with_capacity(4);
    if let Some(sub) = sub_event {
        keys.push(sub.to_string());
    }
    if let Some(ty) = payload_type {
        keys.push(ty.to_string());
    }
    if sub_event == Some(MESSAGE_KEY) && payload_type == Some(MESSAGE_KEY) {
        keys.push(MESSAGE_KEY.to_string());
    }
    keys.push(UNKNOWN_KEY.to_string());
    keys
}
