#![forbid(unsafe_code)]

//! Identities and connection handles.
//!
//! Observers and emitters are identified by process-unique ids drawn from a
//! monotonic counter. Ids are never reused, so a [`ConnectionHandle`] kept
//! past the lifetime of either end can never be mistaken for a connection of
//! a newer object.

use std::fmt;
use std::rc::Weak;
use std::sync::atomic::{AtomicU64, Ordering};

use sigwire_list::NodeKey;

use crate::delegate::DelegateId;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Identity of an [`Observer`](crate::Observer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

impl ObserverId {
    pub(crate) fn next() -> Self {
        Self(next_id())
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "observer#{}", self.0)
    }
}

/// Identity of an [`Emitter`](crate::Emitter).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EmitterId(u64);

impl EmitterId {
    pub(crate) fn next() -> Self {
        Self(next_id())
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EmitterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "emitter#{}", self.0)
    }
}

/// Names one live connection between an emitter and an observer.
///
/// Returned by every `connect` call and by [`Slot::connection`](crate::Slot::connection).
/// Pass it to [`Observer::disconnect`](crate::Observer::disconnect) to end the
/// connection in O(1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionHandle {
    pub(crate) emitter: EmitterId,
    pub(crate) observer: ObserverId,
    pub(crate) entry: NodeKey,
    pub(crate) anchor: NodeKey,
}

impl ConnectionHandle {
    /// The emitter side of the connection.
    #[must_use]
    pub const fn emitter(&self) -> EmitterId {
        self.emitter
    }

    /// The observer side of the connection.
    #[must_use]
    pub const fn observer(&self) -> ObserverId {
        self.observer
    }
}

/// Emitter-side operations an observer needs without knowing the argument
/// type of the emitter.
pub(crate) trait EntrySide {
    fn emitter_id(&self) -> EmitterId;

    /// Unlink and drop an entry whose anchor has already been removed.
    fn detach_entry(&self, entry: NodeKey);

    /// Object and method identity of the delegate carried by `entry`, if it
    /// is a delegate bound to a method.
    fn entry_delegate(&self, entry: NodeKey) -> Option<DelegateId>;
}

/// Observer-side half of a connection pair.
pub(crate) struct Anchor {
    pub(crate) emitter: Weak<dyn EntrySide>,
    pub(crate) emitter_id: EmitterId,
    pub(crate) entry: NodeKey,
}

impl fmt::Debug for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Anchor")
            .field("emitter", &self.emitter_id)
            .field("entry", &self.entry)
            .finish()
    }
}
