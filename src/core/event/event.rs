use std::sync::Arc;

/// Stable identity used to key multiplexer registrations and to route
/// posted events back to their source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventTarget(usize);

impl EventTarget {
    /// Identity of the value behind an `Arc`, which never moves.
    pub fn of<T>(owner: &Arc<T>) -> Self {
        Self(Arc::as_ptr(owner) as *const () as usize)
    }

    pub fn from_raw(id: usize) -> Self {
        Self(id)
    }

    pub fn as_raw(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum EventKind {
    /// A listening socket has a connection waiting to be accepted.
    Connecting,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    pub target: EventTarget,
}

impl Event {
    pub fn new(kind: EventKind, target: EventTarget) -> Self {
        Self { kind, target }
    }

    pub fn connecting(target: EventTarget) -> Self {
        Self::new(EventKind::Connecting, target)
    }
}
