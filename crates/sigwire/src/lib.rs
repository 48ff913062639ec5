#![forbid(unsafe_code)]

//! Synchronous typed signals.
//!
//! An [`Emitter<A>`] delivers `&A` to an ordered list of connections. Each
//! connection targets an [`Observer`]: either a method of an object that
//! embeds one (see [`Observe`]), a closure owned by one, or another emitter
//! of the same argument type (forwarding).
//!
//! Connections are pairs. The emitter holds an entry, the observer holds its
//! anchor, and closing either half removes both. Dropping an emitter or an
//! observer closes everything it is part of, so callbacks never reach a
//! destroyed object.
//!
//! Callbacks may freely connect, disconnect, drop participants and emit
//! again while an emission is running. Each emission walks the list with its
//! own cursor, and removing the entry under a cursor moves the cursor to the
//! next entry.
//!
//! Everything here is single-threaded (`!Send`, `!Sync`).
//!
//! ```
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use sigwire::{Emitter, Observe, Observer, Scan, Slot};
//!
//! struct Status {
//!     observer: Observer,
//!     last: Cell<i32>,
//! }
//!
//! impl Observe for Status {
//!     fn observer(&self) -> &Observer {
//!         &self.observer
//!     }
//! }
//!
//! impl Status {
//!     fn record(&self, code: &i32, _slot: &Slot) {
//!         self.last.set(*code);
//!     }
//! }
//!
//! let exited: Emitter<i32> = Emitter::new();
//! let status = Rc::new(Status { observer: Observer::new(), last: Cell::new(0) });
//!
//! exited.connect(&status, Status::record);
//! exited.emit(3);
//! assert_eq!(status.last.get(), 3);
//!
//! assert_eq!(exited.disconnect(&status, Status::record, Scan::default()), 1);
//! exited.emit(4);
//! assert_eq!(status.last.get(), 3);
//! ```

pub mod config;
pub mod connection;
pub mod cursor;
pub mod delegate;
pub mod emitter;
pub mod error;
pub mod observer;
pub mod signal_ref;

pub use config::EmitterConfig;
pub use connection::{ConnectionHandle, EmitterId, ObserverId};
pub use cursor::Slot;
pub use delegate::{Delegate, DelegateId, Method};
pub use emitter::{Emitter, Scan};
pub use error::SignalError;
pub use observer::{Observe, Observer};
pub use signal_ref::SignalRef;
