//! Test-only subscriber harness shared by this crate's unit tests.
//!
//! Every module's `#[cfg(test)] mod tests` reaches for the same
//! recording subscriber rather than hand-writing one per test file,
//! matching the inline `#[cfg(test)]` placement (no separate
//! `tests/` crate) used throughout this codebase's existing test
//! suites.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::dropped::{self, DroppedSignal};
use crate::error::Error;
use crate::subscriber::Subscriber;
use crate::subscription::Subscription;

/// Records every signal delivered to it for later assertion.
pub struct RecordingSubscriber<T> {
    subscription: Mutex<Option<Arc<dyn Subscription<T>>>>,
    values: Mutex<Vec<T>>,
    error: Mutex<Option<String>>,
    complete: AtomicBool,
    done: AtomicBool,
    conditional: bool,
    accept: Box<dyn Fn(&T) -> bool + Send + Sync>,
}

impl<T> RecordingSubscriber<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// A plain (non-conditional) recording subscriber.
    pub fn new() -> Arc<Self> {
        Arc::new(RecordingSubscriber {
            subscription: Mutex::new(None),
            values: Mutex::new(Vec::new()),
            error: Mutex::new(None),
            complete: AtomicBool::new(false),
            done: AtomicBool::new(false),
            conditional: false,
            accept: Box::new(|_| true),
        })
    }

    /// A conditional recording subscriber: `accept` decides whether an
    /// item offered via `try_on_next` is taken (and recorded) or
    /// rejected without consuming demand.
    pub fn conditional<F>(accept: F) -> Arc<Self>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Arc::new(RecordingSubscriber {
            subscription: Mutex::new(None),
            values: Mutex::new(Vec::new()),
            error: Mutex::new(None),
            complete: AtomicBool::new(false),
            done: AtomicBool::new(false),
            conditional: true,
            accept: Box::new(accept),
        })
    }

    /// The subscription handed to this subscriber by `on_subscribe`,
    /// if any.
    pub fn subscription(&self) -> Option<Arc<dyn Subscription<T>>> {
        self.subscription
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Request `n` more elements from the held subscription.
    pub fn request(&self, n: u64) {
        if let Some(sub) = self.subscription() {
            sub.request(n);
        }
    }

    /// Cancel the held subscription.
    pub fn cancel(&self) {
        if let Some(sub) = self.subscription() {
            sub.cancel();
        }
    }

    /// Values recorded so far, in delivery order.
    pub fn values(&self) -> Vec<T> {
        self.values.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// The error message recorded, if `on_error` was called.
    pub fn error(&self) -> Option<String> {
        self.error.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// `true` once `on_complete` was observed.
    pub fn is_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }
}

impl<T> Subscriber<T> for RecordingSubscriber<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn on_subscribe(&self, subscription: Arc<dyn Subscription<T>>) {
        let mut guard = self.subscription.lock().unwrap_or_else(|p| p.into_inner());
        if !crate::subscription::validate_subscribe(guard.is_some(), &subscription, self) {
            return;
        }
        *guard = Some(subscription);
    }

    fn on_next(&self, value: T) {
        self.values
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(value);
    }

    fn on_error(&self, error: Error) {
        if self.done.swap(true, Ordering::AcqRel) {
            dropped::report(DroppedSignal::<T>::Error(error));
            return;
        }
        *self.error.lock().unwrap_or_else(|p| p.into_inner()) = Some(error.to_string());
    }

    fn on_complete(&self) {
        if self.done.swap(true, Ordering::AcqRel) {
            dropped::report(DroppedSignal::<T>::Complete);
            return;
        }
        self.complete.store(true, Ordering::Release);
    }

    fn is_conditional(&self) -> bool {
        self.conditional
    }

    fn try_on_next(&self, value: T) -> bool {
        if (self.accept)(&value) {
            self.on_next(value);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct RecordingSubscription {
        cancels: AtomicUsize,
    }

    impl Subscription<i32> for RecordingSubscription {
        fn request(&self, _n: u64) {}
        fn cancel(&self) {
            self.cancels.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn second_on_subscribe_is_cancelled_and_reported_as_violation() {
        let subscriber = RecordingSubscriber::<i32>::new();
        let first = Arc::new(RecordingSubscription::default());
        let second = Arc::new(RecordingSubscription::default());

        subscriber.on_subscribe(first.clone());
        subscriber.on_subscribe(second.clone());

        assert_eq!(0, first.cancels.load(Ordering::SeqCst));
        assert_eq!(1, second.cancels.load(Ordering::SeqCst));
        assert!(subscriber.error().is_some());
    }

    #[test]
    fn second_conflicting_terminal_signal_is_dropped_not_recorded() {
        let subscriber = RecordingSubscriber::<i32>::new();

        let drops = Arc::new(AtomicUsize::new(0));
        let observed = drops.clone();
        dropped::set_hook(move |_| {
            observed.fetch_add(1, Ordering::SeqCst);
        });

        subscriber.on_complete();
        subscriber.on_error(Error::violation(crate::error::Violation::NullValue));

        assert!(subscriber.is_complete());
        assert!(subscriber.error().is_none());
        assert_eq!(1, drops.load(Ordering::SeqCst));

        dropped::reset_hook();
    }
}
