//! Fusion mode negotiation.
//!
//! Fusion lets two operators that sit next to each other skip the
//! push protocol and exchange values by synchronous polling instead.
//! Negotiation is a capability probe (`try_fuse`), not a runtime type
//! query: a [`crate::subscription::Subscription`] that does not
//! support fusion simply inherits the default implementation and
//! always grants [`FusionMode::None`].

/// A requested or granted fusion mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FusionMode {
    /// No fusion; fall back to push delivery.
    None,
    /// The source can hand back already-computed values synchronously.
    Sync,
    /// The source computes values lazily on each poll (not produced by
    /// anything in this crate, but a downstream may still request it).
    Async,
    /// The requester accepts either `Sync` or `Async`.
    Any,
}

impl FusionMode {
    /// `true` if `self` (as a request) accepts `granted` as a reply.
    pub fn accepts(self, granted: FusionMode) -> bool {
        match self {
            FusionMode::None => granted == FusionMode::None,
            FusionMode::Sync => granted == FusionMode::Sync,
            FusionMode::Async => granted == FusionMode::Async,
            FusionMode::Any => granted != FusionMode::None,
        }
    }
}

/// Internal state machine for a one-slot synchronous fusion buffer, as
/// used by [`crate::iterable::IterablePublisher`]'s fused subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SyncFusionState {
    /// Upstream confirmed another element exists but it has not been
    /// fetched yet.
    HasNextNoValue,
    /// An element has been materialised into the one-slot buffer.
    HasNextHasValue,
    /// The source is drained. Terminal.
    NoNext,
    /// The previous element was consumed; re-probe on next `is_empty`.
    CallHasNext,
}

impl Default for SyncFusionState {
    fn default() -> Self {
        SyncFusionState::CallHasNext
    }
}
