//! Deferred subscription arbitration.
//!
//! An operator that needs to hand a subscriber some `Subscription`
//! before it actually knows what it will subscribe to — because the
//! real upstream subscription arrives later, possibly on another
//! thread — hands out a [`DeferredSubscriptionArbiter`] instead. It
//! buffers `request`/`cancel` until the real subscription is `set`,
//! then replays them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::demand::DemandCounter;
use crate::subscription::Subscription;

/// Holds at most one real upstream [`Subscription`], buffering demand
/// and cancellation that arrive before it does.
#[derive(Default)]
pub struct DeferredSubscriptionArbiter<T> {
    pending: DemandCounter,
    cancelled: AtomicBool,
    inner: Mutex<Option<Box<dyn Subscription<T>>>>,
}

impl<T> std::fmt::Debug for DeferredSubscriptionArbiter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredSubscriptionArbiter")
            .field("pending", &self.pending)
            .field("cancelled", &self.cancelled)
            .finish()
    }
}

impl<T> DeferredSubscriptionArbiter<T> {
    /// Create an empty arbiter.
    pub fn new() -> Self {
        DeferredSubscriptionArbiter {
            pending: DemandCounter::new(),
            cancelled: AtomicBool::new(false),
            inner: Mutex::new(None),
        }
    }

    /// Request `n` more elements. Buffered until a subscription is
    /// installed if none is present yet.
    pub fn request(&self, n: u64) {
        let guard = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        match guard.as_ref() {
            Some(sub) => sub.request(n),
            None => {
                self.pending.add(n);
            }
        }
    }

    /// Install the real subscription.
    ///
    /// If the arbiter was already cancelled, `sub` is cancelled
    /// immediately and discarded. Otherwise any demand accumulated
    /// while no subscription was present is forwarded at once.
    pub fn set(&self, sub: Box<dyn Subscription<T>>) {
        if self.cancelled.load(Ordering::Acquire) {
            log::trace!("arbiter: subscription installed after cancel, cancelling on arrival");
            sub.cancel();
            return;
        }
        let pending = self.pending.get();
        if pending > 0 {
            log::trace!("arbiter: forwarding {} buffered demand to new subscription", pending);
            sub.request(pending);
        }
        let mut guard = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        *guard = Some(sub);
        // A cancel racing `set` itself is handled by the check above;
        // re-check after taking the lock in case it landed in between.
        if self.cancelled.load(Ordering::Acquire) {
            if let Some(sub) = guard.take() {
                sub.cancel();
            }
        }
    }

    /// Cancel the held subscription, if any, and mark the arbiter so a
    /// subscription installed afterwards is cancelled on arrival.
    /// Idempotent.
    pub fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        log::debug!("arbiter: cancelled");
        let mut guard = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(sub) = guard.take() {
            sub.cancel();
        }
    }

    /// `true` once `cancel` has been observed.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}
