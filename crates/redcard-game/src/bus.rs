//! Named synchronous publish/subscribe.
//!
//! One `EventBus` type serves both the inbound command router (one per
//! [`Controller`](crate::controller::Controller)) and each session's phase
//! broadcasts. Handlers run inline in registration order; the first failure
//! stops the emission and is returned to the emitter.

use std::collections::HashMap;
use std::fmt;

/// Boxed handler for payload `E` failing with `X`.
pub type Handler<E, X> = Box<dyn Fn(&E) -> Result<(), X> + Send + Sync>;

/// Mapping from event name to an ordered list of handlers.
pub struct EventBus<E, X> {
    listeners: HashMap<String, Vec<Handler<E, X>>>,
}

impl<E, X> EventBus<E, X> {
    /// Create a bus with no listeners.
    pub fn new() -> Self {
        Self {
            listeners: HashMap::new(),
        }
    }

    /// Register `handler` for `event`. Handlers for the same name run in the
    /// order they were registered.
    pub fn on<F>(&mut self, event: impl Into<String>, handler: F)
    where
        F: Fn(&E) -> Result<(), X> + Send + Sync + 'static,
    {
        self.listeners
            .entry(event.into())
            .or_default()
            .push(Box::new(handler));
    }

    /// Invoke every handler registered for `event` with `payload`.
    ///
    /// Returns the number of handlers that ran. A failing handler aborts the
    /// rest of this emission and its error is returned.
    pub fn emit(&self, event: &str, payload: &E) -> Result<usize, X> {
        let Some(handlers) = self.listeners.get(event) else {
            return Ok(0);
        };
        for handler in handlers {
            handler(payload)?;
        }
        Ok(handlers.len())
    }

    /// Remove every handler for every event name.
    pub fn clear_listeners(&mut self) {
        self.listeners.clear();
    }

    /// Number of handlers registered for `event`.
    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners.get(event).map_or(0, Vec::len)
    }

    /// Whether no handler is registered under any name.
    pub fn is_empty(&self) -> bool {
        self.listeners.values().all(Vec::is_empty)
    }
}

impl<E, X> Default for EventBus<E, X> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E, X> fmt::Debug for EventBus<E, X> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<(&str, usize)> = self
            .listeners
            .iter()
            .map(|(name, handlers)| (name.as_str(), handlers.len()))
            .collect();
        names.sort_unstable();
        f.debug_struct("EventBus").field("listeners", &names).finish()
    }
}
