//! Saturating accounting for outstanding demand.
//!
//! A [`DemandCounter`] tracks how many elements a subscriber has asked
//! for but not yet received. It saturates at [`UNBOUNDED`] rather than
//! overflowing, and treats that sentinel as absorbing: once a counter
//! reaches it, further additions and subtractions are no-ops.

use std::sync::atomic::{AtomicU64, Ordering};

/// Sentinel demand meaning "no limit". Chosen to match the largest
/// value a 63-bit signed request count (the historical Reactive
/// Streams `Long.MAX_VALUE` convention) can express.
pub const UNBOUNDED: u64 = i64::max_value() as u64;

/// Returns `true` iff `n` is a well-formed `request(n)` argument.
///
/// The Reactive Streams rule is `n > 0`; since this crate's `request`
/// takes an unsigned count, that collapses to `n != 0`.
pub fn validate(n: u64) -> bool {
    n != 0
}

/// A lock-free, saturating, non-negative demand counter.
#[derive(Debug, Default)]
pub struct DemandCounter(AtomicU64);

impl DemandCounter {
    /// Create a counter starting at zero demand.
    pub const fn new() -> Self {
        DemandCounter(AtomicU64::new(0))
    }

    /// Current demand, without claiming it.
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    /// `true` once this counter has reached [`UNBOUNDED`].
    pub fn is_unbounded(&self) -> bool {
        self.get() == UNBOUNDED
    }

    /// Add `n` to the counter, saturating at [`UNBOUNDED`].
    ///
    /// Returns the value immediately before the update, matching the
    /// `addCap` convention: callers that need to know whether they
    /// transitioned the counter `0 -> positive` (and therefore own the
    /// emission loop) compare the returned value against zero.
    pub fn add(&self, n: u64) -> u64 {
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            if current == UNBOUNDED {
                return UNBOUNDED;
            }
            let next = current.saturating_add(n).min(UNBOUNDED);
            match self.0.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(prev) => {
                    log::trace!("demand: {} + {} -> {}", prev, n, next);
                    return prev;
                }
                Err(observed) => current = observed,
            }
        }
    }

    /// Subtract `n` items that have actually been produced.
    ///
    /// A no-op once the counter is [`UNBOUNDED`]. It is a protocol
    /// violation for `n` to exceed the current demand; callers must
    /// only report items they were entitled to emit.
    pub fn produced(&self, n: u64) {
        if n == 0 {
            return;
        }
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            if current == UNBOUNDED {
                return;
            }
            debug_assert!(
                n <= current,
                "produced more items than were requested: {} > {}",
                n,
                current
            );
            let next = current.saturating_sub(n);
            match self.0.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    log::trace!("demand: produced {} of {} -> {}", n, current, next);
                    return;
                }
                Err(observed) => current = observed,
            }
        }
    }

    /// Subtract `n` and return the resulting value in one atomic step.
    /// A no-op (returns [`UNBOUNDED`]) once the counter is unbounded.
    /// This is the primitive the iterable source's bounded drain loop
    /// uses to both fold in items it just emitted and discover,
    /// without a second round trip, whether any further demand arrived
    /// while it was emitting.
    pub fn sub_and_get(&self, n: u64) -> u64 {
        if n == 0 {
            return self.get();
        }
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            if current == UNBOUNDED {
                return UNBOUNDED;
            }
            let next = current.saturating_sub(n);
            match self.0.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return next,
                Err(observed) => current = observed,
            }
        }
    }

    /// Atomically replace the counter with `n - folded`, saturating at
    /// zero, where `folded` is an amount already produced under the
    /// old demand. Used by [`crate::multi::MultiSubscriptionSubscriber`]
    /// when swapping upstream subscriptions: `requested <- requested -
    /// produced`.
    pub fn fold_produced(&self, produced: u64) {
        self.produced(produced);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_zero() {
        assert!(!validate(0));
        assert!(validate(1));
        assert!(validate(UNBOUNDED));
    }

    #[test]
    fn add_accumulates() {
        let demand = DemandCounter::new();
        assert_eq!(0, demand.add(3));
        assert_eq!(3, demand.add(4));
        assert_eq!(7, demand.get());
    }

    #[test]
    fn add_saturates_at_unbounded() {
        let demand = DemandCounter::new();
        demand.add(UNBOUNDED - 1);
        demand.add(10);
        assert_eq!(UNBOUNDED, demand.get());
        demand.add(5);
        assert_eq!(UNBOUNDED, demand.get());
    }

    #[test]
    fn produced_decrements() {
        let demand = DemandCounter::new();
        demand.add(10);
        demand.produced(4);
        assert_eq!(6, demand.get());
    }

    #[test]
    fn produced_is_noop_once_unbounded() {
        let demand = DemandCounter::new();
        demand.add(UNBOUNDED);
        demand.produced(1_000_000);
        assert_eq!(UNBOUNDED, demand.get());
    }
}
