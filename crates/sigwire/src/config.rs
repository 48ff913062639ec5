#![forbid(unsafe_code)]

//! Per-emitter configuration.

/// Configuration for an [`Emitter`](crate::Emitter).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmitterConfig {
    /// Maximum nesting depth of emissions on one emitter. A nested `emit`
    /// that would exceed it is refused.
    pub max_depth: usize,
    /// Open a `trace` span around every emission.
    pub trace_emits: bool,
    /// Name included in log fields.
    pub label: Option<&'static str>,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            max_depth: 64,
            trace_emits: false,
            label: None,
        }
    }
}

impl EmitterConfig {
    #[must_use]
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth,
            ..Self::default()
        }
    }

    /// No depth limit. Forwarding cycles will recurse until the stack runs out.
    #[must_use]
    pub fn unlimited() -> Self {
        Self::new(usize::MAX)
    }

    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    #[must_use]
    pub fn with_trace_emits(mut self, enabled: bool) -> Self {
        self.trace_emits = enabled;
        self
    }

    #[must_use]
    pub fn with_label(mut self, label: &'static str) -> Self {
        self.label = Some(label);
        self
    }
}
