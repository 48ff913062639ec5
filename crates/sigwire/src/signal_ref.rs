#![forbid(unsafe_code)]

//! Connect-only view of an emitter.
//!
//! Components usually own their emitters and expose them for subscription
//! without letting callers fire them. [`SignalRef`] borrows an [`Emitter`]
//! and offers every connect, disconnect and query operation, but no `emit`.

use std::fmt;
use std::rc::Rc;

use crate::connection::{ConnectionHandle, EmitterId};
use crate::cursor::Slot;
use crate::delegate::Method;
use crate::emitter::{Emitter, Scan};
use crate::observer::{Observe, Observer};

/// A borrowed emitter that can be subscribed to but not emitted.
///
/// ```
/// use sigwire::{Emitter, Observer, SignalRef};
///
/// struct Button {
///     clicked: Emitter<()>,
/// }
///
/// impl Button {
///     fn clicked(&self) -> SignalRef<'_, ()> {
///         self.clicked.signal_ref()
///     }
/// }
///
/// let button = Button { clicked: Emitter::new() };
/// let window = Observer::new();
/// button.clicked().connect_fn(&window, |_, _| {});
/// assert_eq!(button.clicked().count_connections(), 1);
/// ```
pub struct SignalRef<'a, A: 'static> {
    emitter: &'a Emitter<A>,
}

impl<A: 'static> Clone for SignalRef<'_, A> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A: 'static> Copy for SignalRef<'_, A> {}

impl<A: 'static> fmt::Debug for SignalRef<'_, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SignalRef").field(self.emitter).finish()
    }
}

impl<'a, A: 'static> From<&'a Emitter<A>> for SignalRef<'a, A> {
    fn from(emitter: &'a Emitter<A>) -> Self {
        Self::new(emitter)
    }
}

impl<'a, A: 'static> SignalRef<'a, A> {
    #[must_use]
    pub fn new(emitter: &'a Emitter<A>) -> Self {
        Self { emitter }
    }

    #[must_use]
    pub fn id(&self) -> EmitterId {
        self.emitter.id()
    }

    pub fn connect<T: Observe>(&self, target: &Rc<T>, method: Method<T, A>) -> ConnectionHandle {
        self.emitter.connect(target, method)
    }

    pub fn connect_at<T: Observe>(
        &self,
        target: &Rc<T>,
        method: Method<T, A>,
        index: isize,
    ) -> ConnectionHandle {
        self.emitter.connect_at(target, method, index)
    }

    pub fn connect_fn<F>(&self, observer: &Observer, f: F) -> ConnectionHandle
    where
        F: Fn(&A, &Slot) + 'static,
    {
        self.emitter.connect_fn(observer, f)
    }

    pub fn connect_fn_at<F>(&self, observer: &Observer, f: F, index: isize) -> ConnectionHandle
    where
        F: Fn(&A, &Slot) + 'static,
    {
        self.emitter.connect_fn_at(observer, f, index)
    }

    /// Forward this emitter into `other`.
    pub fn connect_emitter(&self, other: &Emitter<A>) -> ConnectionHandle {
        self.emitter.connect_emitter(other)
    }

    pub fn connect_emitter_at(&self, other: &Emitter<A>, index: isize) -> ConnectionHandle {
        self.emitter.connect_emitter_at(other, index)
    }

    pub fn disconnect<T: Observe>(&self, target: &Rc<T>, method: Method<T, A>, scan: Scan) -> usize {
        self.emitter.disconnect(target, method, scan)
    }

    pub fn disconnect_emitter(&self, other: &Emitter<A>, scan: Scan) -> usize {
        self.emitter.disconnect_emitter(other, scan)
    }

    pub fn disconnect_any(&self, scan: Scan) -> usize {
        self.emitter.disconnect_any(scan)
    }

    pub fn disconnect_all(&self) -> usize {
        self.emitter.disconnect_all()
    }

    pub fn disconnect_all_to<T: Observe>(&self, target: &Rc<T>, method: Method<T, A>) -> usize {
        self.emitter.disconnect_all_to(target, method)
    }

    pub fn disconnect_all_emitter(&self, other: &Emitter<A>) -> usize {
        self.emitter.disconnect_all_emitter(other)
    }

    #[must_use]
    pub fn is_connected_to<T: Observe>(&self, target: &Rc<T>, method: Method<T, A>) -> bool {
        self.emitter.is_connected_to(target, method)
    }

    #[must_use]
    pub fn is_connected_to_emitter(&self, other: &Emitter<A>) -> bool {
        self.emitter.is_connected_to_emitter(other)
    }

    #[must_use]
    pub fn is_connected_to_observer(&self, observer: &Observer) -> bool {
        self.emitter.is_connected_to_observer(observer)
    }

    #[must_use]
    pub fn count_connections(&self) -> usize {
        self.emitter.count_connections()
    }

    #[must_use]
    pub fn count_connections_to<T: Observe>(&self, target: &Rc<T>, method: Method<T, A>) -> usize {
        self.emitter.count_connections_to(target, method)
    }

    #[must_use]
    pub fn count_connections_to_emitter(&self, other: &Emitter<A>) -> usize {
        self.emitter.count_connections_to_emitter(other)
    }

    /// Number of emitters forwarding into the viewed emitter.
    #[must_use]
    pub fn count_bindings(&self) -> usize {
        self.emitter.count_bindings()
    }
}
