#![forbid(unsafe_code)]

//! Error type for the few fallible operations.

use crate::connection::{EmitterId, ObserverId};

/// Errors reported by sigwire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalError {
    /// A nested emission would exceed the emitter's configured depth.
    DepthExceeded {
        emitter: EmitterId,
        depth: usize,
        limit: usize,
    },
    /// The connection named by a handle no longer exists.
    StaleConnection,
    /// The handle belongs to a different observer.
    ForeignConnection {
        expected: ObserverId,
        found: ObserverId,
    },
}

impl std::fmt::Display for SignalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DepthExceeded {
                emitter,
                depth,
                limit,
            } => write!(
                f,
                "{emitter}: emission depth {depth} exceeds limit {limit}"
            ),
            Self::StaleConnection => write!(f, "connection already closed"),
            Self::ForeignConnection { expected, found } => {
                write!(f, "handle belongs to {found}, not {expected}")
            }
        }
    }
}

impl std::error::Error for SignalError {}
