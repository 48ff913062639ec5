#![forbid(unsafe_code)]

//! Typed broadcaster.
//!
//! # Design
//!
//! [`Emitter<A>`] owns an ordered list of entries, one per outbound
//! connection. Each entry is paired with an anchor in the list of the
//! receiving [`Observer`]. Either side can close the pair: the closing side
//! removes its own node, then asks the other side to remove its mate.
//!
//! # Delivery
//!
//! `emit` walks the entries front to back with a cursor registered in the
//! current entry's mark chain. Callbacks may connect, disconnect, drop
//! emitters or observers, and emit again, all while the walk is in
//! progress:
//!
//! - A removed entry hands its marks to its successor, so a cursor never
//!   follows a removed entry.
//! - Entries inserted after the cursor's position are visited by the
//!   running walk; entries inserted before it are not.
//! - Nested emissions on the same emitter get their own cursor. Nesting is
//!   bounded by [`EmitterConfig::max_depth`].
//!
//! # Performance
//!
//! | Operation           | Complexity                 |
//! |---------------------|----------------------------|
//! | `connect`           | O(1), O(k) with an index   |
//! | `emit`              | O(E) where E = entries     |
//! | `disconnect(scan)`  | O(E)                       |
//! | handle disconnect   | O(1)                       |

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use sigwire_list::{LinkedSlab, NodeKey};
use tracing::{debug, trace, trace_span, warn};

use crate::config::EmitterConfig;
use crate::connection::{Anchor, ConnectionHandle, EmitterId, EntrySide, ObserverId};
use crate::cursor::{Cursor, MarkChain, Slot};
use crate::delegate::{Delegate, DelegateId, Method};
use crate::error::SignalError;
use crate::observer::{Observe, Observer, ObserverCore};
use crate::signal_ref::SignalRef;

/// Where a scan-based disconnect starts and how many matches it removes.
///
/// `start >= 0` counts from the front and scans toward the back.
/// `start < 0` counts from the back (`-1` = last entry) and scans toward the
/// front. A negative `count` removes every match in the scanned range;
/// `count == 0` removes nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scan {
    pub start: isize,
    pub count: isize,
}

impl Default for Scan {
    /// The most recently added match.
    fn default() -> Self {
        Self {
            start: -1,
            count: 1,
        }
    }
}

impl Scan {
    #[must_use]
    pub const fn new(start: isize, count: isize) -> Self {
        Self { start, count }
    }

    /// Every match, scanning from the back.
    #[must_use]
    pub const fn all() -> Self {
        Self::new(-1, -1)
    }

    /// The first `count` matches, scanning from the front.
    #[must_use]
    pub const fn first(count: isize) -> Self {
        Self::new(0, count)
    }

    /// The last `count` matches, scanning from the back.
    #[must_use]
    pub const fn last(count: isize) -> Self {
        Self::new(-1, count)
    }

    fn limit(self) -> usize {
        usize::try_from(self.count).unwrap_or(usize::MAX)
    }
}

/// What an entry does when invoked.
enum Payload<A: 'static> {
    Delegate(Delegate<A>),
    Forward {
        target: Weak<EmitterCore<A>>,
        id: EmitterId,
    },
}

impl<A: 'static> Clone for Payload<A> {
    fn clone(&self) -> Self {
        match self {
            Self::Delegate(delegate) => Self::Delegate(delegate.clone()),
            Self::Forward { target, id } => Self::Forward {
                target: target.clone(),
                id: *id,
            },
        }
    }
}

impl<A: 'static> Payload<A> {
    fn invoke(&self, args: &A, slot: &Slot) {
        match self {
            Self::Delegate(delegate) => delegate.invoke(args, slot),
            Self::Forward { target, id } => {
                let Some(target) = target.upgrade() else {
                    return;
                };
                if let Err(err) = target.emit_ref(args) {
                    debug!(target_emitter = %id, %err, "forwarded emission refused");
                }
            }
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Delegate(_) => "delegate",
            Self::Forward { .. } => "forward",
        }
    }
}

/// Emitter-side half of a connection pair.
struct Entry<A: 'static> {
    payload: Payload<A>,
    observer: Weak<ObserverCore>,
    observer_id: ObserverId,
    anchor: NodeKey,
    marks: MarkChain,
}

struct DepthGuard<'a>(&'a Cell<usize>);

impl<'a> DepthGuard<'a> {
    fn enter(depth: &'a Cell<usize>) -> (Self, usize) {
        let level = depth.get() + 1;
        depth.set(level);
        (Self(depth), level)
    }
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get() - 1);
    }
}

/// Shared state of an emitter. Forwarding entries and anchors hold it weakly.
pub(crate) struct EmitterCore<A: 'static> {
    id: EmitterId,
    this: Weak<EmitterCore<A>>,
    config: EmitterConfig,
    entries: RefCell<LinkedSlab<Entry<A>>>,
    depth: Cell<usize>,
    /// Inbound side, used when another emitter forwards into this one.
    observer: Observer,
}

impl<A: 'static> EmitterCore<A> {
    fn label(&self) -> &'static str {
        self.config.label.unwrap_or("")
    }

    /// Create both halves of a connection and link them.
    fn link(&self, observer: &Rc<ObserverCore>, payload: Payload<A>, index: isize) -> ConnectionHandle {
        let kind = payload.kind();
        let observer_id = observer.id();
        let entry = self.entries.borrow_mut().insert_at(
            index,
            Entry {
                payload,
                observer: Rc::downgrade(observer),
                observer_id,
                anchor: NodeKey::DANGLING,
                marks: MarkChain::default(),
            },
        );
        let side: Weak<dyn EntrySide> = self.this.clone();
        let anchor = observer.attach(Anchor {
            emitter: side,
            emitter_id: self.id,
            entry,
        });
        if let Some(slot) = self.entries.borrow_mut().get_mut(entry) {
            slot.anchor = anchor;
        }
        trace!(
            emitter = %self.id,
            label = self.label(),
            observer = %observer_id,
            index,
            kind,
            "connected"
        );
        ConnectionHandle {
            emitter: self.id,
            observer: observer_id,
            entry,
            anchor,
        }
    }

    /// Unlink an entry, moving every cursor marked on it to its successor.
    fn remove_entry(&self, key: NodeKey) -> Option<Entry<A>> {
        let mut entries = self.entries.borrow_mut();
        let next = entries.next(key);
        let mut entry = entries.remove(key)?;
        for cursor in entry.marks.take_live() {
            debug_assert_eq!(cursor.current(), Some(key), "cursor marked on a foreign entry");
            cursor.relocate(next);
            if let Some(successor) = next.and_then(|n| entries.get_mut(n)) {
                successor.marks.push(&cursor);
            }
        }
        Some(entry)
    }

    /// Close a connection from this side: remove the entry, then the anchor.
    fn close(&self, key: NodeKey) -> bool {
        let entry = self.remove_entry(key);
        let Some(entry) = entry else {
            return false;
        };
        if let Some(observer) = entry.observer.upgrade() {
            let anchor = observer.detach_anchor(entry.anchor);
            debug_assert!(
                anchor.as_ref().is_none_or(|a| a.entry == key),
                "anchor paired with a different entry"
            );
        }
        trace!(
            emitter = %self.id,
            label = self.label(),
            observer = %entry.observer_id,
            kind = entry.payload.kind(),
            "disconnected"
        );
        // Payload drops here, after every borrow is released.
        drop(entry);
        true
    }

    fn disconnect_all(&self) -> usize {
        let mut closed = 0;
        loop {
            let front = self.entries.borrow().front();
            let Some(key) = front else {
                break;
            };
            if self.close(key) {
                closed += 1;
            }
        }
        if closed > 0 {
            debug!(emitter = %self.id, label = self.label(), closed, "emitter disconnected all");
        }
        closed
    }

    /// Close up to `scan.count` entries matching `matches`, walking from
    /// `scan.start` toward the far end.
    fn disconnect_scan(&self, scan: Scan, matches: impl Fn(&Entry<A>) -> bool) -> usize {
        if scan.count == 0 {
            return 0;
        }
        let targets: Vec<NodeKey> = {
            let entries = self.entries.borrow();
            match entries.locate(scan.start) {
                Some((start, direction)) => entries
                    .keys_from(Some(start), direction)
                    .filter(|key| entries.get(*key).is_some_and(&matches))
                    .take(scan.limit())
                    .collect(),
                None => Vec::new(),
            }
        };
        targets.into_iter().filter(|key| self.close(*key)).count()
    }

    fn any_entry(&self, matches: impl Fn(&Entry<A>) -> bool) -> bool {
        self.entries.borrow().values().any(matches)
    }

    fn count_entries(&self, matches: impl Fn(&Entry<A>) -> bool) -> usize {
        self.entries.borrow().values().filter(|e| matches(e)).count()
    }

    pub(crate) fn emit_ref(&self, args: &A) -> Result<(), SignalError> {
        let limit = self.config.max_depth;
        if self.depth.get() >= limit {
            let depth = self.depth.get() + 1;
            warn!(emitter = %self.id, label = self.label(), depth, limit, "nested emission refused");
            return Err(SignalError::DepthExceeded {
                emitter: self.id,
                depth,
                limit,
            });
        }
        let (_guard, depth) = DepthGuard::enter(&self.depth);
        let _span = self
            .config
            .trace_emits
            .then(|| trace_span!("emit", emitter = %self.id, label = self.label(), depth).entered());

        let cursor = Cursor::new();
        {
            let mut entries = self.entries.borrow_mut();
            let start = entries.front();
            if let Some(first) = start.and_then(|k| entries.get_mut(k)) {
                first.marks.push(&cursor);
            }
            cursor.advance(start);
        }

        while let Some(key) = cursor.current() {
            let invocation = self.entries.borrow().get(key).map(|entry| {
                (
                    entry.payload.clone(),
                    ConnectionHandle {
                        emitter: self.id,
                        observer: entry.observer_id,
                        entry: key,
                        anchor: entry.anchor,
                    },
                )
            });
            debug_assert!(invocation.is_some(), "cursor positioned on a removed entry");
            let Some((payload, connection)) = invocation else {
                break;
            };

            let slot = Slot::new(Rc::clone(&cursor), connection, depth);
            payload.invoke(args, &slot);
            drop(slot);
            drop(payload);

            if cursor.take_skip() {
                // The entry was removed during the call; the cursor already
                // sits on its successor.
                continue;
            }

            let mut entries = self.entries.borrow_mut();
            let next = entries.next(key);
            if let Some(entry) = entries.get_mut(key) {
                entry.marks.remove(&cursor);
            }
            if let Some(successor) = next.and_then(|n| entries.get_mut(n)) {
                successor.marks.push(&cursor);
            }
            cursor.advance(next);
        }
        Ok(())
    }

    #[cfg(test)]
    fn marks_on(&self, key: NodeKey) -> usize {
        self.entries
            .borrow()
            .get(key)
            .map_or(0, |entry| entry.marks.len())
    }
}

impl<A: 'static> EntrySide for EmitterCore<A> {
    fn emitter_id(&self) -> EmitterId {
        self.id
    }

    fn detach_entry(&self, key: NodeKey) {
        let entry = self.remove_entry(key);
        if let Some(entry) = entry {
            trace!(
                emitter = %self.id,
                label = self.label(),
                observer = %entry.observer_id,
                kind = entry.payload.kind(),
                "disconnected by observer"
            );
        }
    }

    fn entry_delegate(&self, key: NodeKey) -> Option<DelegateId> {
        match &self.entries.borrow().get(key)?.payload {
            Payload::Delegate(delegate) => delegate.id(),
            Payload::Forward { .. } => None,
        }
    }
}

/// A typed broadcaster.
///
/// `A` is the argument type delivered to every connection; use a tuple for
/// several values. Every callback receives `&A` and the current [`Slot`].
///
/// Dropping the emitter closes all of its connections, outbound and inbound.
///
/// ```
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use sigwire::{Emitter, Observer};
///
/// let resized: Emitter<(u16, u16)> = Emitter::new();
/// let relayout: Emitter<(u16, u16)> = Emitter::new();
/// resized.connect_emitter(&relayout);
///
/// let seen = Rc::new(RefCell::new(Vec::new()));
/// let sink = Observer::new();
/// let log = Rc::clone(&seen);
/// relayout.connect_fn(&sink, move |&(w, h), _slot| log.borrow_mut().push(w * h));
///
/// resized.emit((80, 24));
/// assert_eq!(*seen.borrow(), vec![1920]);
/// ```
pub struct Emitter<A: 'static> {
    core: Rc<EmitterCore<A>>,
}

impl<A: 'static> Default for Emitter<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: 'static> fmt::Debug for Emitter<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("id", &self.core.id)
            .field("label", &self.core.config.label)
            .field("connections", &self.count_connections())
            .field("bindings", &self.count_bindings())
            .field("depth", &self.core.depth.get())
            .finish()
    }
}

impl<A: 'static> Drop for Emitter<A> {
    fn drop(&mut self) {
        self.core.disconnect_all();
        self.core.observer.disconnect_all();
    }
}

impl<A: 'static> Emitter<A> {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(EmitterConfig::default())
    }

    #[must_use]
    pub fn with_config(config: EmitterConfig) -> Self {
        Self {
            core: Rc::new_cyclic(|this| EmitterCore {
                id: EmitterId::next(),
                this: this.clone(),
                config,
                entries: RefCell::new(LinkedSlab::new()),
                depth: Cell::new(0),
                observer: Observer::new(),
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> EmitterId {
        self.core.id
    }

    #[must_use]
    pub fn config(&self) -> &EmitterConfig {
        &self.core.config
    }

    /// The inbound side of this emitter, target of forwarding connections.
    #[must_use]
    pub fn as_observer(&self) -> &Observer {
        &self.core.observer
    }

    /// A connect-only view that cannot emit.
    #[must_use]
    pub fn signal_ref(&self) -> SignalRef<'_, A> {
        SignalRef::new(self)
    }

    // ========================================================================
    // Connect
    // ========================================================================

    /// Connect `method` of `target`, delivered after every existing entry.
    pub fn connect<T: Observe>(&self, target: &Rc<T>, method: Method<T, A>) -> ConnectionHandle {
        self.connect_at(target, method, -1)
    }

    /// Connect `method` of `target` at a signed position.
    ///
    /// `index >= 0` inserts before the entry `index` steps from the front
    /// (append past the end). `index < 0` inserts after the entry
    /// `-index - 1` steps from the back (prepend past the front).
    pub fn connect_at<T: Observe>(
        &self,
        target: &Rc<T>,
        method: Method<T, A>,
        index: isize,
    ) -> ConnectionHandle {
        let delegate = Delegate::from_method(target, method);
        self.core.link(
            target.observer().core(),
            Payload::Delegate(delegate),
            index,
        )
    }

    /// Connect a closure owned by `observer`. Closure connections have no
    /// method identity and are only matched by unconditional operations.
    pub fn connect_fn<F>(&self, observer: &Observer, f: F) -> ConnectionHandle
    where
        F: Fn(&A, &Slot) + 'static,
    {
        self.connect_fn_at(observer, f, -1)
    }

    pub fn connect_fn_at<F>(&self, observer: &Observer, f: F, index: isize) -> ConnectionHandle
    where
        F: Fn(&A, &Slot) + 'static,
    {
        self.core.link(
            observer.core(),
            Payload::Delegate(Delegate::from_fn(f)),
            index,
        )
    }

    /// Forward every emission to `other`.
    pub fn connect_emitter(&self, other: &Emitter<A>) -> ConnectionHandle {
        self.connect_emitter_at(other, -1)
    }

    pub fn connect_emitter_at(&self, other: &Emitter<A>, index: isize) -> ConnectionHandle {
        self.core.link(
            other.core.observer.core(),
            Payload::Forward {
                target: Rc::downgrade(&other.core),
                id: other.core.id,
            },
            index,
        )
    }

    // ========================================================================
    // Disconnect
    // ========================================================================

    /// Disconnect connections to `method` of `target` selected by `scan`.
    /// Returns how many were closed.
    pub fn disconnect<T: Observe>(&self, target: &Rc<T>, method: Method<T, A>, scan: Scan) -> usize {
        let observer = target.observer().id();
        self.core
            .disconnect_scan(scan, |entry| delegate_matches(entry, observer, target, method))
    }

    /// Disconnect forwarding connections to `other` selected by `scan`.
    pub fn disconnect_emitter(&self, other: &Emitter<A>, scan: Scan) -> usize {
        let id = other.id();
        self.core
            .disconnect_scan(scan, |entry| forward_matches(entry, id))
    }

    /// Disconnect connections of any kind selected by `scan`.
    pub fn disconnect_any(&self, scan: Scan) -> usize {
        self.core.disconnect_scan(scan, |_| true)
    }

    /// Disconnect every connection to `method` of `target`, last first.
    pub fn disconnect_all_to<T: Observe>(&self, target: &Rc<T>, method: Method<T, A>) -> usize {
        self.disconnect(target, method, Scan::all())
    }

    /// Disconnect every forwarding connection to `other`, last first.
    pub fn disconnect_all_emitter(&self, other: &Emitter<A>) -> usize {
        self.disconnect_emitter(other, Scan::all())
    }

    /// Close every outbound connection.
    pub fn disconnect_all(&self) -> usize {
        self.core.disconnect_all()
    }

    // ========================================================================
    // Queries
    // ========================================================================

    #[must_use]
    pub fn is_connected_to<T: Observe>(&self, target: &Rc<T>, method: Method<T, A>) -> bool {
        let observer = target.observer().id();
        self.core
            .any_entry(|entry| delegate_matches(entry, observer, target, method))
    }

    #[must_use]
    pub fn is_connected_to_emitter(&self, other: &Emitter<A>) -> bool {
        let id = other.id();
        self.core.any_entry(|entry| forward_matches(entry, id))
    }

    /// Whether any connection links this emitter and `observer`, judged from
    /// either side.
    #[must_use]
    pub fn is_connected_to_observer(&self, observer: &Observer) -> bool {
        let id = observer.id();
        self.core.any_entry(|entry| entry.observer_id == id) || observer.core().links_to(self.core.id)
    }

    /// Number of outbound connections.
    #[must_use]
    pub fn count_connections(&self) -> usize {
        self.core.entries.borrow().len()
    }

    #[must_use]
    pub fn count_connections_to<T: Observe>(&self, target: &Rc<T>, method: Method<T, A>) -> usize {
        let observer = target.observer().id();
        self.core
            .count_entries(|entry| delegate_matches(entry, observer, target, method))
    }

    #[must_use]
    pub fn count_connections_to_emitter(&self, other: &Emitter<A>) -> usize {
        let id = other.id();
        self.core.count_entries(|entry| forward_matches(entry, id))
    }

    /// Number of emitters forwarding into this one.
    #[must_use]
    pub fn count_bindings(&self) -> usize {
        self.core.observer.count_connections()
    }

    // ========================================================================
    // Emit
    // ========================================================================

    /// Deliver `args` to every connection, front to back.
    ///
    /// A refused nested emission (depth limit) is logged and otherwise
    /// ignored; use [`try_emit`](Self::try_emit) to observe it.
    pub fn emit(&self, args: A) {
        let _ = self.core.emit_ref(&args);
    }

    /// Like [`emit`](Self::emit), reporting a refused nested emission.
    ///
    /// # Errors
    ///
    /// [`SignalError::DepthExceeded`] when this call would nest deeper than
    /// [`EmitterConfig::max_depth`]. Nothing is delivered in that case.
    pub fn try_emit(&self, args: A) -> Result<(), SignalError> {
        self.core.emit_ref(&args)
    }

    /// Current nesting depth of emissions on this emitter.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.core.depth.get()
    }
}

fn delegate_matches<T, A: 'static>(
    entry: &Entry<A>,
    observer: ObserverId,
    target: &Rc<T>,
    method: Method<T, A>,
) -> bool {
    entry.observer_id == observer
        && matches!(&entry.payload, Payload::Delegate(d) if d.is_bound_to(target, method))
}

fn forward_matches<A: 'static>(entry: &Entry<A>, target: EmitterId) -> bool {
    matches!(&entry.payload, Payload::Forward { id, .. } if *id == target)
}
