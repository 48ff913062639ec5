#![forbid(unsafe_code)]

//! Bound callables.
//!
//! A [`Delegate`] is what an emitter invokes for each connection. It is
//! either bound to an object and one of its methods, or wraps a plain
//! closure.
//!
//! Method-bound delegates hold the object weakly: the emitter never keeps a
//! subscriber alive, and a call that races the object's destruction is
//! skipped. Two method-bound delegates are equal when they name the same
//! object allocation and the same function address. Closure delegates only
//! equal clones of themselves.
//!
//! Function identity is the function's address. Two methods with identical
//! bodies may be folded into one function by the optimizer and then compare
//! equal.

use std::fmt;
use std::rc::Rc;

use crate::cursor::Slot;

/// Signature of a method that can be connected to an `Emitter<A>`.
pub type Method<T, A> = fn(&T, &A, &Slot);

type Callback<A> = Rc<dyn Fn(&A, &Slot)>;

fn callback<A, F>(f: F) -> Callback<A>
where
    F: Fn(&A, &Slot) + 'static,
{
    Rc::new(f)
}

/// Object + method identity of a method-bound delegate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DelegateId {
    object: usize,
    method: usize,
}

impl DelegateId {
    #[must_use]
    pub fn of<T, A>(object: &Rc<T>, method: Method<T, A>) -> Self {
        Self {
            object: Rc::as_ptr(object).cast::<()>() as usize,
            method: method_addr(method),
        }
    }

    /// Address of the bound function.
    #[must_use]
    pub const fn method(&self) -> usize {
        self.method
    }
}

#[inline]
fn method_addr<T, A>(method: Method<T, A>) -> usize {
    method as *const () as usize
}

/// A callable invoked with the emitted arguments and the current [`Slot`].
pub struct Delegate<A> {
    callback: Callback<A>,
    id: Option<DelegateId>,
}

impl<A> Clone for Delegate<A> {
    fn clone(&self) -> Self {
        Self {
            callback: Rc::clone(&self.callback),
            id: self.id,
        }
    }
}

impl<A> fmt::Debug for Delegate<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delegate").field("id", &self.id).finish()
    }
}

impl<A: 'static> Delegate<A> {
    /// Bind `method` to `object`.
    #[must_use]
    pub fn from_method<T: 'static>(object: &Rc<T>, method: Method<T, A>) -> Self {
        let id = DelegateId::of(object, method);
        let weak = Rc::downgrade(object);
        Self {
            callback: callback(move |args, slot| {
                if let Some(object) = weak.upgrade() {
                    method(&object, args, slot);
                }
            }),
            id: Some(id),
        }
    }

    /// Wrap a closure. The delegate has no method identity.
    #[must_use]
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&A, &Slot) + 'static,
    {
        Self {
            callback: callback(f),
            id: None,
        }
    }
}

impl<A> Delegate<A> {
    #[inline]
    pub fn invoke(&self, args: &A, slot: &Slot) {
        (self.callback)(args, slot);
    }

    /// Identity of a method-bound delegate, `None` for closures.
    #[must_use]
    pub fn id(&self) -> Option<DelegateId> {
        self.id
    }

    /// Same object and method for method-bound delegates, same closure
    /// allocation otherwise.
    #[must_use]
    pub fn equals(&self, other: &Self) -> bool {
        match (self.id, other.id) {
            (Some(a), Some(b)) => a == b,
            (None, None) => Rc::ptr_eq(&self.callback, &other.callback),
            _ => false,
        }
    }

    #[must_use]
    pub fn is_bound_to<T>(&self, object: &Rc<T>, method: Method<T, A>) -> bool {
        self.id == Some(DelegateId::of(object, method))
    }
}
