//! Listener types and handles

use crate::connection::ConnectionState;
use analysis_common::ClientError;
use analysis_protocol::{EventKind, InboundEvent};
use std::sync::Arc;

/// Callback for decoded inbound events
pub type EventListener = Arc<dyn Fn(&InboundEvent) + Send + Sync>;

/// Callback for connection state transitions
pub type StateListener = Arc<dyn Fn(&ConnectionState) + Send + Sync>;

/// Callback for connection errors
pub type ErrorListener = Arc<dyn Fn(&ClientError) + Send + Sync>;

/// Which registry a listener lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Event(EventKind),
    State,
    Error,
}

/// Stable token returned by every `subscribe`/`on_*` call
///
/// Pass it back to `unsubscribe` to remove the listener; no reference to the
/// original closure is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle {
    pub(crate) id: u64,
    pub(crate) topic: Topic,
}

impl ListenerHandle {
    #[must_use]
    pub fn topic(&self) -> Topic {
        self.topic
    }
}

/// One registered listener
pub(crate) struct Slot<L: ?Sized> {
    pub(crate) id: u64,
    pub(crate) listener: Arc<L>,
}

impl<L: ?Sized> Clone for Slot<L> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            listener: Arc::clone(&self.listener),
        }
    }
}

/// Identity comparison that ignores vtable pointers
pub(crate) fn same_listener<L: ?Sized>(a: &Arc<L>, b: &Arc<L>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
