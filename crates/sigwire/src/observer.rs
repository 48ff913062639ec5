#![forbid(unsafe_code)]

//! The receiving side of connections.
//!
//! An [`Observer`] owns the anchors of every connection that delivers into
//! it. A type that wants its methods connected to emitters embeds an
//! `Observer` and implements [`Observe`]. Dropping the observer (normally as
//! part of dropping the object) closes all of its connections, so an emitter
//! never calls into a destroyed object.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use sigwire_list::{LinkedSlab, NodeKey};
use tracing::{debug, trace};

use crate::connection::{Anchor, ConnectionHandle, EmitterId, EntrySide, ObserverId};
use crate::delegate::{DelegateId, Method};
use crate::error::SignalError;

/// Implemented by types whose methods can be connected to an emitter.
pub trait Observe: 'static {
    fn observer(&self) -> &Observer;
}

/// Shared state of an observer. Emitters hold it weakly.
pub(crate) struct ObserverCore {
    id: ObserverId,
    anchors: RefCell<LinkedSlab<Anchor>>,
}

impl ObserverCore {
    pub(crate) fn id(&self) -> ObserverId {
        self.id
    }

    /// Append the anchor of a new connection.
    pub(crate) fn attach(&self, anchor: Anchor) -> NodeKey {
        self.anchors.borrow_mut().push_back(anchor)
    }

    /// Remove an anchor whose entry is being removed by the emitter.
    pub(crate) fn detach_anchor(&self, key: NodeKey) -> Option<Anchor> {
        self.anchors.borrow_mut().remove(key)
    }

    /// Close a connection from this side: remove the anchor, then the entry.
    fn close(&self, key: NodeKey) -> bool {
        let anchor = self.anchors.borrow_mut().remove(key);
        let Some(anchor) = anchor else {
            return false;
        };
        trace!(
            observer = %self.id,
            emitter = %anchor.emitter_id,
            "closing connection from observer"
        );
        if let Some(emitter) = anchor.emitter.upgrade() {
            debug_assert_eq!(emitter.emitter_id(), anchor.emitter_id);
            emitter.detach_entry(anchor.entry);
        }
        true
    }

    pub(crate) fn links_to(&self, emitter: EmitterId) -> bool {
        self.anchors
            .borrow()
            .values()
            .any(|anchor| anchor.emitter_id == emitter)
    }

    #[cfg(test)]
    pub(crate) fn anchor_entry(&self, key: NodeKey) -> Option<NodeKey> {
        self.anchors.borrow().get(key).map(|anchor| anchor.entry)
    }

    fn matching_keys(&self, target: DelegateId, from_back: bool) -> Vec<NodeKey> {
        let links: Vec<(NodeKey, Weak<dyn EntrySide>, NodeKey)> = {
            let anchors = self.anchors.borrow();
            let mut links: Vec<_> = anchors
                .keys()
                .filter_map(|key| {
                    anchors
                        .get(key)
                        .map(|anchor| (key, anchor.emitter.clone(), anchor.entry))
                })
                .collect();
            if from_back {
                links.reverse();
            }
            links
        };
        links
            .into_iter()
            .filter(|(_, emitter, entry)| {
                emitter
                    .upgrade()
                    .is_some_and(|emitter| emitter.entry_delegate(*entry) == Some(target))
            })
            .map(|(key, ..)| key)
            .collect()
    }
}

/// Owner of the inbound half of every connection into one object.
///
/// ```
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use sigwire::{Emitter, Observe, Observer, Slot};
///
/// struct Meter {
///     observer: Observer,
///     total: Cell<u64>,
/// }
///
/// impl Observe for Meter {
///     fn observer(&self) -> &Observer {
///         &self.observer
///     }
/// }
///
/// impl Meter {
///     fn add(&self, n: &u64, _slot: &Slot) {
///         self.total.set(self.total.get() + n);
///     }
/// }
///
/// let bytes: Emitter<u64> = Emitter::new();
/// let meter = Rc::new(Meter { observer: Observer::new(), total: Cell::new(0) });
/// bytes.connect(&meter, Meter::add);
/// bytes.emit(40);
/// bytes.emit(2);
/// assert_eq!(meter.total.get(), 42);
///
/// drop(meter);
/// assert_eq!(bytes.count_connections(), 0);
/// ```
pub struct Observer {
    core: Rc<ObserverCore>,
}

impl Default for Observer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("id", &self.core.id)
            .field("connections", &self.count_connections())
            .finish()
    }
}

impl Drop for Observer {
    fn drop(&mut self) {
        self.disconnect_all();
    }
}

impl Observer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            core: Rc::new(ObserverCore {
                id: ObserverId::next(),
                anchors: RefCell::new(LinkedSlab::new()),
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> ObserverId {
        self.core.id
    }

    pub(crate) fn core(&self) -> &Rc<ObserverCore> {
        &self.core
    }

    /// Number of live inbound connections.
    #[must_use]
    pub fn count_connections(&self) -> usize {
        self.core.anchors.borrow().len()
    }

    /// Number of inbound connections delivering to `method` of `object`.
    #[must_use]
    pub fn count_connections_to<T, A>(&self, object: &Rc<T>, method: Method<T, A>) -> usize {
        self.core
            .matching_keys(DelegateId::of(object, method), false)
            .len()
    }

    /// Close one connection.
    ///
    /// # Errors
    ///
    /// [`SignalError::ForeignConnection`] if `handle` was issued for another
    /// observer, [`SignalError::StaleConnection`] if the connection is
    /// already closed.
    pub fn disconnect(&self, handle: ConnectionHandle) -> Result<(), SignalError> {
        if handle.observer != self.core.id {
            return Err(SignalError::ForeignConnection {
                expected: self.core.id,
                found: handle.observer,
            });
        }
        if self.core.close(handle.anchor) {
            Ok(())
        } else {
            Err(SignalError::StaleConnection)
        }
    }

    /// Close every inbound connection. Returns how many were closed.
    pub fn disconnect_all(&self) -> usize {
        let mut closed = 0;
        loop {
            let front = self.core.anchors.borrow().front();
            let Some(key) = front else {
                break;
            };
            if self.core.close(key) {
                closed += 1;
            }
        }
        if closed > 0 {
            debug!(observer = %self.core.id, closed, "observer disconnected all");
        }
        closed
    }

    /// Close every inbound connection delivering to `method` of `object`,
    /// last first. Returns how many were closed.
    pub fn disconnect_all_to<T, A>(&self, object: &Rc<T>, method: Method<T, A>) -> usize {
        self.core
            .matching_keys(DelegateId::of(object, method), true)
            .into_iter()
            .filter(|key| self.core.close(*key))
            .count()
    }
}
