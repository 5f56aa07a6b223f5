//! A synchronous publisher over a Rust iterator, with fast/slow
//! emission paths and synchronous fusion support.
//!
//! Rust's [`Iterator`] does not expose a separate, non-consuming
//! `hasNext()` the way the protocol this crate is modelled on does;
//! probing for "is there another element" and "fetch it" are the same
//! operation (`next()`). That collapses the four fusion states from
//! `SyncFusionState` down to three reachable ones in practice
//! (`CallHasNext` -> `HasNextHasValue` or `NoNext`); `HasNextNoValue`
//! is kept in the enum for fidelity to the state machine this engine
//! implements but is never entered by this source. See `DESIGN.md`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::demand::{self, DemandCounter};
use crate::dropped::{self, DroppedSignal};
use crate::error::{Error, Violation};
use crate::fuse::{FusionMode, SyncFusionState};
use crate::subscriber::Subscriber;
use crate::subscription::{validate_request, CancelledSubscription, Subscription};

type BoxedIter<T> = Box<dyn Iterator<Item = Option<T>> + Send>;
type Factory<T> = Box<dyn Fn() -> Result<BoxedIter<T>, Error> + Send + Sync>;

/// A synchronous source built from a Rust iterator.
///
/// `Option<T>` is the element type the underlying iterator yields
/// internally so a source can legally contain a "null" element (a
/// value absent where the protocol requires one) and exercise the
/// same `NullValue` protocol violation the original source language's
/// iterables can raise. A plain iterable built with [`Self::new`]
/// never contains one.
pub struct IterablePublisher<T> {
    factory: Factory<T>,
}

impl<T> IterablePublisher<T>
where
    T: Send + 'static,
{
    /// Build a publisher over `source`. The iterable is re-obtained
    /// (via `Clone`) on every `subscribe`, matching the Reactive
    /// Streams rule that a publisher may be subscribed to more than
    /// once and each subscription sees the whole sequence.
    pub fn new<C>(source: C) -> Self
    where
        C: IntoIterator<Item = T> + Clone + Send + Sync + 'static,
        C::IntoIter: Send + 'static,
    {
        IterablePublisher {
            factory: Box::new(move || {
                let iter = source.clone().into_iter().map(Some);
                Ok(Box::new(iter) as BoxedIter<T>)
            }),
        }
    }

    /// As [`Self::new`], but the iterable may contain `None` elements
    /// representing a "null" value; emitting one is a protocol
    /// violation (`on_error(NullValue)`) rather than being forwarded.
    pub fn new_nullable<C>(source: C) -> Self
    where
        C: IntoIterator<Item = Option<T>> + Clone + Send + Sync + 'static,
        C::IntoIter: Send + 'static,
    {
        IterablePublisher {
            factory: Box::new(move || Ok(Box::new(source.clone().into_iter()) as BoxedIter<T>)),
        }
    }

    /// Build a publisher from a fallible iterator factory. Obtaining
    /// the iterator is re-tried on every `subscribe`; a factory error
    /// becomes `on_subscribe(cancelled) + on_error(e)` per subscriber.
    pub fn from_factory<F, I>(factory: F) -> Self
    where
        F: Fn() -> Result<I, Error> + Send + Sync + 'static,
        I: Iterator<Item = Option<T>> + Send + 'static,
    {
        IterablePublisher {
            factory: Box::new(move || factory().map(|iter| Box::new(iter) as BoxedIter<T>)),
        }
    }

    /// A publisher that immediately fails every subscriber with a
    /// fresh copy of `error`.
    pub fn error<F>(error: F) -> Self
    where
        F: Fn() -> Error + Send + Sync + 'static,
    {
        IterablePublisher::from_factory(move || Err::<std::iter::Empty<Option<T>>, Error>(error()))
    }
}

impl<T> crate::subscriber::Publisher<T> for IterablePublisher<T>
where
    T: Send + 'static,
{
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        match (self.factory)() {
            Ok(iter) => IterableSubscription::start(iter, subscriber),
            Err(err) => {
                subscriber.on_subscribe(Arc::new(CancelledSubscription));
                subscriber.on_error(err);
            }
        }
    }
}

struct State<T> {
    iter: BoxedIter<T>,
    fusion: SyncFusionState,
    buffered: Option<T>,
    pending_null: bool,
}

/// The subscription an [`IterablePublisher`] hands to each subscriber.
pub struct IterableSubscription<T> {
    state: Mutex<State<T>>,
    subscriber: Arc<dyn Subscriber<T>>,
    requested: DemandCounter,
    stopped: AtomicBool,
    fused: AtomicBool,
}

impl<T> IterableSubscription<T>
where
    T: Send + 'static,
{
    fn start(iter: BoxedIter<T>, subscriber: Arc<dyn Subscriber<T>>) {
        log::debug!("iterable: new subscription");
        let sub = Arc::new(IterableSubscription {
            state: Mutex::new(State {
                iter,
                fusion: SyncFusionState::CallHasNext,
                buffered: None,
                pending_null: false,
            }),
            subscriber: subscriber.clone(),
            requested: DemandCounter::new(),
            stopped: AtomicBool::new(false),
            fused: AtomicBool::new(false),
        });
        subscriber.on_subscribe(sub);
    }

    fn complete(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        self.subscriber.on_complete();
    }

    fn fail(&self, err: Error) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            dropped::report(DroppedSignal::<T>::Error(err));
            return;
        }
        self.subscriber.on_error(err);
    }

    fn emit_one(&self, value: T) -> bool {
        if self.subscriber.is_conditional() {
            self.subscriber.try_on_next(value)
        } else {
            self.subscriber.on_next(value);
            true
        }
    }

    fn next_raw(&self) -> Option<Option<T>> {
        self.state.lock().unwrap_or_else(|p| p.into_inner()).iter.next()
    }

    fn drain_unbounded(&self) {
        loop {
            if self.stopped.load(Ordering::Acquire) {
                return;
            }
            let item = self.next_raw();
            if self.stopped.load(Ordering::Acquire) {
                return;
            }
            match item {
                None => {
                    self.complete();
                    return;
                }
                Some(None) => {
                    self.fail(Error::violation(Violation::NullValue));
                    return;
                }
                Some(Some(v)) => {
                    self.emit_one(v);
                }
            }
        }
    }

    fn drain_bounded(&self, initial: u64) {
        let mut r = initial;
        let mut e: u64 = 0;
        loop {
            while e != r {
                if self.stopped.load(Ordering::Acquire) {
                    return;
                }
                let item = self.next_raw();
                if self.stopped.load(Ordering::Acquire) {
                    return;
                }
                match item {
                    None => {
                        self.complete();
                        return;
                    }
                    Some(None) => {
                        self.fail(Error::violation(Violation::NullValue));
                        return;
                    }
                    Some(Some(v)) => {
                        if self.emit_one(v) {
                            e += 1;
                        }
                        if self.requested.is_unbounded() {
                            self.drain_unbounded();
                            return;
                        }
                    }
                }
            }
            r = self.requested.sub_and_get(e);
            if r == 0 {
                return;
            }
            e = 0;
        }
    }

    fn drain(&self, initial_demand: u64) {
        if initial_demand == demand::UNBOUNDED {
            self.drain_unbounded();
        } else {
            self.drain_bounded(initial_demand);
        }
    }
}

impl<T> Subscription<T> for IterableSubscription<T>
where
    T: Send + 'static,
{
    fn request(&self, n: u64) {
        if self.stopped.load(Ordering::Acquire) {
            return;
        }
        if self.fused.load(Ordering::Acquire) {
            // Under fusion the consumer drives progress via poll();
            // request(n) still needs to be accepted so mixed
            // push/pull callers don't deadlock, but there is no
            // push-side drain loop to kick off.
            return;
        }
        if !validate_request(n, &self.subscriber) {
            self.stopped.store(true, Ordering::Release);
            return;
        }
        let previous = self.requested.add(n);
        if previous == 0 {
            self.drain(self.requested.get());
        }
    }

    fn cancel(&self) {
        log::debug!("iterable: cancelled");
        self.stopped.store(true, Ordering::Release);
    }

    fn try_fuse(&self, requested: FusionMode) -> FusionMode {
        if requested == FusionMode::None {
            return FusionMode::None;
        }
        if !requested.accepts(FusionMode::Sync) {
            // This source only ever offers synchronous fusion.
            return FusionMode::None;
        }
        self.fused.store(true, Ordering::Release);
        FusionMode::Sync
    }

    fn is_empty(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        match state.fusion {
            SyncFusionState::NoNext => true,
            SyncFusionState::HasNextHasValue => false,
            SyncFusionState::HasNextNoValue => false,
            SyncFusionState::CallHasNext => match state.iter.next() {
                None => {
                    log::trace!("iterable: fusion state CallHasNext -> NoNext");
                    state.fusion = SyncFusionState::NoNext;
                    true
                }
                Some(None) => {
                    log::trace!("iterable: fusion state CallHasNext -> HasNextHasValue (null)");
                    state.pending_null = true;
                    state.fusion = SyncFusionState::HasNextHasValue;
                    false
                }
                Some(Some(v)) => {
                    log::trace!("iterable: fusion state CallHasNext -> HasNextHasValue");
                    state.buffered = Some(v);
                    state.fusion = SyncFusionState::HasNextHasValue;
                    false
                }
            },
        }
    }

    fn poll(&self) -> Option<T> {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if state.pending_null {
            state.pending_null = false;
            state.fusion = SyncFusionState::CallHasNext;
            drop(state);
            self.fail(Error::violation(Violation::NullValue));
            return None;
        }
        let value = state.buffered.take();
        log::trace!("iterable: fusion state {:?} -> CallHasNext", state.fusion);
        state.fusion = SyncFusionState::CallHasNext;
        value
    }

    fn clear(&self) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.buffered = None;
        state.pending_null = false;
        state.fusion = SyncFusionState::CallHasNext;
    }

    fn size(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        match state.fusion {
            SyncFusionState::NoNext => 0,
            SyncFusionState::CallHasNext => 0,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscriber::Publisher;
    use crate::testing::RecordingSubscriber;

    #[test]
    fn just_one_emits_value_then_completes() {
        let publisher = IterablePublisher::new(vec![1]);
        let subscriber = RecordingSubscriber::new();
        publisher.subscribe(subscriber.clone());
        subscriber.request(demand::UNBOUNDED);

        assert_eq!(vec![1], subscriber.values());
        assert!(subscriber.is_complete());
        assert!(subscriber.error().is_none());
    }

    #[test]
    fn empty_completes_without_values() {
        let publisher = IterablePublisher::<i32>::new(Vec::new());
        let subscriber = RecordingSubscriber::new();
        publisher.subscribe(subscriber.clone());
        subscriber.request(1);

        assert!(subscriber.values().is_empty());
        assert!(subscriber.is_complete());
    }

    #[test]
    fn error_source_fails_immediately() {
        #[derive(Debug)]
        struct Forced;
        impl std::fmt::Display for Forced {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "forced failure")
            }
        }
        impl std::error::Error for Forced {}

        let publisher = IterablePublisher::<i32>::error(|| Error::upstream(Forced));
        let subscriber = RecordingSubscriber::new();
        publisher.subscribe(subscriber.clone());
        subscriber.request(1);

        assert!(subscriber.values().is_empty());
        assert!(!subscriber.is_complete());
        assert_eq!(Some("forced failure".to_string()), subscriber.error());
    }

    #[test]
    fn bounded_demand_drains_exactly_what_was_requested() {
        let source: Vec<i32> = (1..=1000).collect();
        let publisher = IterablePublisher::new(source);
        let subscriber = RecordingSubscriber::new();
        publisher.subscribe(subscriber.clone());

        subscriber.request(3);
        subscriber.request(2);
        assert_eq!(vec![1, 2, 3, 4, 5], subscriber.values());
        assert!(!subscriber.is_complete());

        subscriber.request(995);
        assert_eq!(1000, subscriber.values().len());
        assert!(subscriber.is_complete());
    }

    #[test]
    fn null_element_midstream_errors_without_emitting_later_values() {
        let publisher = IterablePublisher::new_nullable(vec![Some(1), None, Some(3)]);
        let subscriber = RecordingSubscriber::new();
        publisher.subscribe(subscriber.clone());
        subscriber.request(demand::UNBOUNDED);

        assert_eq!(vec![1], subscriber.values());
        assert!(subscriber.error().is_some());
        assert!(!subscriber.is_complete());
    }

    #[test]
    fn conditional_subscriber_rejection_does_not_consume_demand() {
        // A conditional subscriber that only accepts even values: each
        // rejection must not count against the 2 elements requested,
        // so both evens are still delivered out of a 5-element source.
        let publisher = IterablePublisher::new(vec![1, 2, 3, 4, 5]);
        let subscriber = RecordingSubscriber::conditional(|v: &i32| v % 2 == 0);
        publisher.subscribe(subscriber.clone());
        subscriber.request(2);
        assert_eq!(vec![2, 4], subscriber.values());
        assert!(!subscriber.is_complete());

        subscriber.request(1);
        assert_eq!(vec![2, 4], subscriber.values());
        assert!(subscriber.is_complete());
    }

    #[test]
    fn fusion_poll_yields_elements_in_order() {
        let publisher = IterablePublisher::new(vec![10, 20, 30]);
        let subscriber = RecordingSubscriber::new();
        publisher.subscribe(subscriber.clone());

        let subscription = subscriber.subscription().expect("on_subscribe called");
        assert_eq!(FusionMode::Sync, subscription.try_fuse(FusionMode::Any));

        let mut collected = Vec::new();
        while !subscription.is_empty() {
            collected.push(subscription.poll().expect("value present"));
        }
        assert_eq!(vec![10, 20, 30], collected);
    }
}
