#![forbid(unsafe_code)]

//! Emission cursors and the per-entry mark chain.
//!
//! Every `emit` call walks the emitter's entry list with its own [`Cursor`].
//! While positioned at an entry, the cursor is registered in that entry's
//! mark chain as a weak reference. Removing an entry moves every live mark
//! to the entry's successor and sets the cursor's skip flag, so the walk
//! resumes from a live entry instead of following a removed one.
//!
//! # Invariants
//!
//! 1. A live cursor with `current == Some(k)` is marked on entry `k` and on no
//!    other entry.
//! 2. `skip` is set only by relocation and cleared by the walk before it
//!    decides whether to advance.
//! 3. Marks of cursors whose emission has ended (normally or by unwinding)
//!    are dead weak references and are pruned the next time the chain is
//!    touched.

use std::cell::Cell;
use std::fmt;
use std::rc::{Rc, Weak};

use sigwire_list::NodeKey;
use smallvec::SmallVec;

use crate::connection::{ConnectionHandle, EmitterId, ObserverId};
use crate::emitter::Emitter;

/// Iteration state of one emission.
#[derive(Debug, Default)]
pub(crate) struct Cursor {
    current: Cell<Option<NodeKey>>,
    skip: Cell<bool>,
}

impl Cursor {
    pub(crate) fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    #[inline]
    pub(crate) fn current(&self) -> Option<NodeKey> {
        self.current.get()
    }

    /// Move forward after the current entry was invoked.
    #[inline]
    pub(crate) fn advance(&self, to: Option<NodeKey>) {
        self.current.set(to);
    }

    /// Move to the successor of a removed entry.
    #[inline]
    pub(crate) fn relocate(&self, to: Option<NodeKey>) {
        self.current.set(to);
        self.skip.set(true);
    }

    #[inline]
    pub(crate) fn take_skip(&self) -> bool {
        self.skip.replace(false)
    }

    #[inline]
    fn skipping(&self) -> bool {
        self.skip.get()
    }
}

/// Cursors positioned at one entry.
#[derive(Debug, Default)]
pub(crate) struct MarkChain {
    marks: SmallVec<[Weak<Cursor>; 2]>,
}

impl MarkChain {
    pub(crate) fn push(&mut self, cursor: &Rc<Cursor>) {
        self.prune();
        self.marks.push(Rc::downgrade(cursor));
    }

    pub(crate) fn remove(&mut self, cursor: &Rc<Cursor>) {
        let target = Rc::as_ptr(cursor);
        self.marks
            .retain(|mark| mark.strong_count() > 0 && !std::ptr::eq(mark.as_ptr(), target));
    }

    /// Take every live cursor out of the chain.
    pub(crate) fn take_live(&mut self) -> SmallVec<[Rc<Cursor>; 2]> {
        self.marks.drain(..).filter_map(|mark| mark.upgrade()).collect()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.marks.iter().filter(|mark| mark.strong_count() > 0).count()
    }

    fn prune(&mut self) {
        self.marks.retain(|mark| mark.strong_count() > 0);
    }
}

/// The emission position handed to every callback.
///
/// A slot only lives for the duration of one callback. Use
/// [`connection`](Self::connection) to end the connection being invoked:
///
/// ```
/// use std::rc::Rc;
/// use sigwire::{Emitter, Observe, Observer, Slot};
///
/// struct Once {
///     observer: Observer,
/// }
///
/// impl Observe for Once {
///     fn observer(&self) -> &Observer {
///         &self.observer
///     }
/// }
///
/// impl Once {
///     fn fire(&self, _: &(), slot: &Slot) {
///         let _ = self.observer.disconnect(slot.connection());
///     }
/// }
///
/// let ready: Emitter<()> = Emitter::new();
/// let once = Rc::new(Once { observer: Observer::new() });
/// ready.connect(&once, Once::fire);
/// ready.emit(());
/// assert_eq!(ready.count_connections(), 0);
/// ```
pub struct Slot {
    cursor: Rc<Cursor>,
    connection: ConnectionHandle,
    depth: usize,
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("connection", &self.connection)
            .field("depth", &self.depth)
            .field("closed", &self.connection_closed())
            .finish()
    }
}

impl Slot {
    pub(crate) fn new(cursor: Rc<Cursor>, connection: ConnectionHandle, depth: usize) -> Self {
        Self {
            cursor,
            connection,
            depth,
        }
    }

    /// The connection being invoked.
    #[must_use]
    pub fn connection(&self) -> ConnectionHandle {
        self.connection
    }

    #[must_use]
    pub fn emitter_id(&self) -> EmitterId {
        self.connection.emitter
    }

    #[must_use]
    pub fn observer_id(&self) -> ObserverId {
        self.connection.observer
    }

    #[must_use]
    pub fn is_emitted_by<A: 'static>(&self, emitter: &Emitter<A>) -> bool {
        self.connection.emitter == emitter.id()
    }

    /// Nesting depth of the emission, 1 for a top-level `emit`.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Whether the connection being invoked has been closed during this call.
    #[must_use]
    pub fn connection_closed(&self) -> bool {
        self.cursor.skipping()
    }

    #[cfg(test)]
    pub(crate) fn detached() -> Self {
        Self::new(
            Cursor::new(),
            ConnectionHandle {
                emitter: EmitterId::next(),
                observer: ObserverId::next(),
                entry: NodeKey::DANGLING,
                anchor: NodeKey::DANGLING,
            },
            0,
        )
    }
}
