//! A subscriber that presents a single, stable upstream subscription
//! to its own downstream while the subscription it actually delegates
//! to is swapped out underneath it.
//!
//! This is the scaffolding every re-subscribing operator builds on
//! (see [`crate::retry_when`]): the downstream only ever sees one
//! `on_subscribe`, no matter how many times the operator re-enters the
//! upstream publisher.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::demand::DemandCounter;
use crate::subscription::Subscription;

/// The subscription a [`MultiSubscriptionSubscriber`] hands to its own
/// downstream. `request` adds to the shared demand counter and
/// forwards to whichever upstream subscription is currently installed;
/// `cancel` tears down the current upstream and marks the holder so
/// any subscription set afterwards is cancelled on arrival.
pub struct MultiSubscription<T> {
    requested: Arc<DemandCounter>,
    cancelled: Arc<AtomicBool>,
    current: Arc<Mutex<Option<Box<dyn Subscription<T>>>>>,
}

impl<T> Subscription<T> for MultiSubscription<T> {
    fn request(&self, n: u64) {
        self.requested.add(n);
        let guard = self.current.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(sub) = guard.as_ref() {
            sub.request(n);
        }
    }

    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut guard = self.current.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(sub) = guard.take() {
            sub.cancel();
        }
    }
}

/// Holds the swappable upstream subscription and the produced-items
/// tally that gets folded into outstanding demand on every swap.
pub struct MultiSubscriptionSubscriber<T> {
    requested: Arc<DemandCounter>,
    produced: AtomicU64,
    cancelled: Arc<AtomicBool>,
    current: Arc<Mutex<Option<Box<dyn Subscription<T>>>>>,
}

impl<T> Default for MultiSubscriptionSubscriber<T> {
    fn default() -> Self {
        MultiSubscriptionSubscriber {
            requested: Arc::new(DemandCounter::new()),
            produced: AtomicU64::new(0),
            cancelled: Arc::new(AtomicBool::new(false)),
            current: Arc::new(Mutex::new(None)),
        }
    }
}

impl<T> MultiSubscriptionSubscriber<T> {
    /// Create an empty holder.
    pub fn new() -> Self {
        Self::default()
    }

    /// The single, stable subscription to hand to a downstream
    /// subscriber's `on_subscribe`. Cloning this is cheap; every clone
    /// controls the same underlying state.
    pub fn subscription(&self) -> MultiSubscription<T> {
        MultiSubscription {
            requested: self.requested.clone(),
            cancelled: self.cancelled.clone(),
            current: self.current.clone(),
        }
    }

    /// Record that `n` items were delivered since the last swap.
    pub fn produced(&self, n: u64) {
        self.produced.fetch_add(n, Ordering::AcqRel);
    }

    /// Fold the produced tally into outstanding demand without
    /// swapping in a new subscription. Used when an upstream
    /// subscription has already terminated (with an error, say) and
    /// the caller wants `requested` to reflect what was actually
    /// delivered before a replacement subscription shows up later.
    pub fn fold_pending(&self) {
        let produced = self.produced.swap(0, Ordering::AcqRel);
        self.requested.fold_produced(produced);
    }

    /// Swap in a new upstream subscription.
    ///
    /// Folds the produced tally into outstanding demand
    /// (`requested <- requested - produced`, skipped if demand is
    /// unbounded), resets the tally, cancels the previous subscription
    /// if one was present, and forwards any remaining demand to `sub`.
    /// If this holder was already cancelled, `sub` is cancelled instead
    /// of being installed.
    pub fn set(&self, sub: Box<dyn Subscription<T>>) {
        if self.cancelled.load(Ordering::Acquire) {
            log::trace!("multi: subscription installed after cancel, cancelling on arrival");
            sub.cancel();
            return;
        }
        self.fold_pending();

        let mut guard = self.current.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(previous) = guard.take() {
            previous.cancel();
        }

        let remaining = self.requested.get();
        log::debug!("multi: swapped in new subscription, {} demand outstanding", remaining);
        if remaining > 0 {
            sub.request(remaining);
        }
        *guard = Some(sub);

        if self.cancelled.load(Ordering::Acquire) {
            if let Some(sub) = guard.take() {
                sub.cancel();
            }
        }
    }

    /// Cancel the current upstream subscription and mark this holder
    /// so any later `set` cancels on arrival instead of installing.
    pub fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        log::debug!("multi: cancelled");
        let mut guard = self.current.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(sub) = guard.take() {
            sub.cancel();
        }
    }

    /// `true` once `cancel` has been observed.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct RecordingSubscription {
        requested: AtomicU64,
        cancels: AtomicUsize,
    }

    impl Subscription<i32> for RecordingSubscription {
        fn request(&self, n: u64) {
            self.requested.fetch_add(n, Ordering::SeqCst);
        }
        fn cancel(&self) {
            self.cancels.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn folds_produced_into_requested_on_swap() {
        let holder = MultiSubscriptionSubscriber::new();
        let downstream = holder.subscription();
        downstream.request(10);

        let first = Arc::new(RecordingSubscription::default());
        holder.set(Box::new(first.clone()));
        assert_eq!(10, first.requested.load(Ordering::SeqCst));

        holder.produced(4);

        let second = Arc::new(RecordingSubscription::default());
        holder.set(Box::new(second.clone()));

        assert_eq!(1, first.cancels.load(Ordering::SeqCst));
        assert_eq!(6, second.requested.load(Ordering::SeqCst));
    }

    #[test]
    fn cancel_tears_down_current_subscription() {
        let holder = MultiSubscriptionSubscriber::new();
        let sub = Arc::new(RecordingSubscription::default());
        holder.set(Box::new(sub.clone()));

        holder.cancel();
        holder.cancel();

        assert_eq!(1, sub.cancels.load(Ordering::SeqCst));
        assert!(holder.is_cancelled());
    }
}
