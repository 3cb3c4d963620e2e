//! Event dispatcher
//!
//! Fans decoded events, state transitions and errors out to registered
//! listeners. Listeners run synchronously on the caller's task; a panicking
//! listener is logged and skipped without affecting the others.

use super::listeners::{
    same_listener, ErrorListener, EventListener, ListenerHandle, Slot, StateListener, Topic,
};
use crate::connection::ConnectionState;
use analysis_common::ClientError;
use analysis_protocol::{EventKind, InboundEvent};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

type EventFn = dyn Fn(&InboundEvent) + Send + Sync;
type StateFn = dyn Fn(&ConnectionState) + Send + Sync;
type ErrorFn = dyn Fn(&ClientError) + Send + Sync;

/// Per-event-type listener registry
pub struct EventDispatcher {
    events: DashMap<EventKind, Vec<Slot<EventFn>>>,
    state: RwLock<Vec<Slot<StateFn>>>,
    errors: RwLock<Vec<Slot<ErrorFn>>>,
    next_id: AtomicU64,
    /// Events delivered to at least one listener
    dispatched: AtomicU64,
    /// Listener invocations that panicked
    panics: AtomicU64,
}

impl EventDispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: DashMap::new(),
            state: RwLock::new(Vec::new()),
            errors: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(0),
            dispatched: AtomicU64::new(0),
            panics: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    // === Event listeners ===

    /// Register `listener` for events of `kind`
    ///
    /// Registering the same `Arc` twice for one kind returns the original handle.
    pub fn subscribe(&self, kind: EventKind, listener: EventListener) -> ListenerHandle {
        let mut slots = self.events.entry(kind).or_default();
        let id = self.insert(&mut slots, listener);
        ListenerHandle {
            id,
            topic: Topic::Event(kind),
        }
    }

    /// Register a closure for events of `kind`
    pub fn on_event<F>(&self, kind: EventKind, listener: F) -> ListenerHandle
    where
        F: Fn(&InboundEvent) + Send + Sync + 'static,
    {
        self.subscribe(kind, Arc::new(listener))
    }

    /// Invoke every listener registered for the event's kind
    ///
    /// Returns the number of listeners invoked. With no listeners the event is dropped.
    pub fn dispatch(&self, event: &InboundEvent) -> usize {
        let kind = event.kind();
        let listeners: Vec<EventListener> = self
            .events
            .get(&kind)
            .map(|slots| slots.iter().map(|slot| Arc::clone(&slot.listener)).collect())
            .unwrap_or_default();

        if listeners.is_empty() {
            tracing::trace!(event_type = %kind, "No listeners, event dropped");
            return 0;
        }

        for listener in &listeners {
            self.invoke(kind.as_str(), || listener(event));
        }
        self.dispatched.fetch_add(1, Ordering::Relaxed);

        tracing::trace!(event_type = %kind, listeners = listeners.len(), "Event dispatched");
        listeners.len()
    }

    #[must_use]
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.events.get(&kind).map_or(0, |slots| slots.len())
    }

    // === State and error listeners ===

    pub fn on_state_change(&self, listener: StateListener) -> ListenerHandle {
        let id = self.insert(&mut self.state.write(), listener);
        ListenerHandle {
            id,
            topic: Topic::State,
        }
    }

    pub fn on_error(&self, listener: ErrorListener) -> ListenerHandle {
        let id = self.insert(&mut self.errors.write(), listener);
        ListenerHandle {
            id,
            topic: Topic::Error,
        }
    }

    pub fn notify_state(&self, state: &ConnectionState) -> usize {
        let listeners = snapshot(&self.state.read());
        for listener in &listeners {
            self.invoke("state", || listener(state));
        }
        listeners.len()
    }

    pub fn notify_error(&self, error: &ClientError) -> usize {
        let listeners = snapshot(&self.errors.read());
        for listener in &listeners {
            self.invoke("error", || listener(error));
        }
        listeners.len()
    }

    #[must_use]
    pub fn state_listener_count(&self) -> usize {
        self.state.read().len()
    }

    #[must_use]
    pub fn error_listener_count(&self) -> usize {
        self.errors.read().len()
    }

    // === Removal ===

    /// Remove the listener behind `handle`; unknown handles are ignored
    pub fn unsubscribe(&self, handle: &ListenerHandle) -> bool {
        let removed = match handle.topic {
            Topic::Event(kind) => self
                .events
                .get_mut(&kind)
                .is_some_and(|mut slots| remove(&mut slots, handle.id)),
            Topic::State => remove(&mut self.state.write(), handle.id),
            Topic::Error => remove(&mut self.errors.write(), handle.id),
        };

        if removed {
            self.events.retain(|_, slots| !slots.is_empty());
            tracing::trace!(topic = ?handle.topic, id = handle.id, "Listener removed");
        }
        removed
    }

    // === Stats ===

    #[must_use]
    pub fn dispatched_count(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn panic_count(&self) -> u64 {
        self.panics.load(Ordering::Relaxed)
    }

    fn insert<L: ?Sized>(&self, slots: &mut Vec<Slot<L>>, listener: Arc<L>) -> u64 {
        if let Some(existing) = slots
            .iter()
            .find(|slot| same_listener(&slot.listener, &listener))
        {
            return existing.id;
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        slots.push(Slot { id, listener });
        id
    }

    fn invoke(&self, topic: &str, call: impl FnOnce()) {
        if let Err(payload) = catch_unwind(AssertUnwindSafe(call)) {
            self.panics.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                topic = topic,
                panic = %panic_message(payload.as_ref()),
                "Listener panicked"
            );
        }
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("event_kinds", &self.events.len())
            .field("state_listeners", &self.state_listener_count())
            .field("error_listeners", &self.error_listener_count())
            .field("dispatched", &self.dispatched_count())
            .finish()
    }
}

fn snapshot<L: ?Sized>(slots: &[Slot<L>]) -> Vec<Arc<L>> {
    slots.iter().map(|slot| Arc::clone(&slot.listener)).collect()
}

fn remove<L: ?Sized>(slots: &mut Vec<Slot<L>>, id: u64) -> bool {
    let before = slots.len();
    slots.retain(|slot| slot.id != id);
    slots.len() != before
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
