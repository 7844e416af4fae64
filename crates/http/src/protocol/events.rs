//! Composed event-listener capability.
//!
//! A plain mapping from event name to an ordered list of subscribers. Any type
//! that wants to expose `on`/`emit` holds an [`EventListeners`] as a field;
//! there is no base type to inherit from. Listeners run synchronously, in
//! subscription order, on the emitting task.

use std::collections::HashMap;
use std::fmt;

type Listener<E> = Box<dyn Fn(&E) + Send + Sync>;

/// An ordered listener registry for events carrying payloads of type `E`.
pub struct EventListeners<E> {
    listeners: HashMap<&'static str, Vec<Listener<E>>>,
}

impl<E> EventListeners<E> {
    pub fn new() -> Self {
        Self { listeners: HashMap::new() }
    }

    /// Subscribes `listener` to `event`. Listeners for one event fire in the
    /// order they were added.
    pub fn on<F>(&mut self, event: &'static str, listener: F)
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.listeners.entry(event).or_default().push(Box::new(listener));
    }

    /// Invokes every listener subscribed to `event` with `payload`.
    ///
    /// Emitting an event nobody subscribed to is a no-op; in particular an
    /// unobserved `error` event never panics.
    pub fn emit(&self, event: &str, payload: &E) {
        if let Some(listeners) = self.listeners.get(event) {
            for listener in listeners {
                listener(payload);
            }
        }
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners.get(event).map_or(0, Vec::len)
    }
}

impl<E> Default for EventListeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for EventListeners<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut counts: Vec<(&str, usize)> = self.listeners.iter().map(|(k, v)| (*k, v.len())).collect();
        counts.sort_unstable();
        f.debug_struct("EventListeners").field("listeners", &counts).finish()
    }
}
