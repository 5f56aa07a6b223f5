//! A minimal hot publisher: forwards each signal straight to every
//! currently-subscribed subscriber, buffers nothing, and replays only
//! the terminal signal (not any values) to a subscriber that joins
//! after termination.
//!
//! This is the companion publisher `retry_when` uses to carry error
//! signals from the main subscriber out to the user-supplied companion
//! function; it is not meant as a general-purpose broadcast primitive.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::Error;
use crate::subscriber::{Publisher, Subscriber};
use crate::subscription::CancelledSubscription;

#[derive(Clone)]
enum Terminal {
    Complete,
    Error(String),
}

/// A hot, unbuffered, multicast publisher of `T`.
pub struct DirectProcessor<T> {
    subscribers: Mutex<Vec<Arc<dyn Subscriber<T>>>>,
    terminated: AtomicBool,
    terminal: Mutex<Option<Terminal>>,
}

impl<T> Default for DirectProcessor<T> {
    fn default() -> Self {
        DirectProcessor {
            subscribers: Mutex::new(Vec::new()),
            terminated: AtomicBool::new(false),
            terminal: Mutex::new(None),
        }
    }
}

impl<T> DirectProcessor<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create an empty processor.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Forward `value` to every current subscriber. A no-op once
    /// terminated.
    pub fn on_next(&self, value: T) {
        if self.terminated.load(Ordering::Acquire) {
            return;
        }
        let subscribers = self.subscribers.lock().unwrap_or_else(|p| p.into_inner());
        for subscriber in subscribers.iter() {
            subscriber.on_next(value.clone());
        }
    }

    /// Terminate every current subscriber with `error`; any subscriber
    /// that joins afterwards is sent a fresh copy of the same terminal
    /// signal immediately upon subscribing.
    pub fn on_error(&self, error: Error) {
        if self.terminated.swap(true, Ordering::AcqRel) {
            return;
        }
        *self.terminal.lock().unwrap_or_else(|p| p.into_inner()) =
            Some(Terminal::Error(error.to_string()));
        let subscribers = std::mem::take(&mut *self.subscribers.lock().unwrap_or_else(|p| p.into_inner()));
        for subscriber in subscribers {
            subscriber.on_error(Error::upstream(TerminalMessage(error.to_string())));
        }
    }

    /// Terminate every current subscriber normally; late subscribers
    /// are completed immediately on subscribing.
    pub fn on_complete(&self) {
        if self.terminated.swap(true, Ordering::AcqRel) {
            return;
        }
        *self.terminal.lock().unwrap_or_else(|p| p.into_inner()) = Some(Terminal::Complete);
        let subscribers = std::mem::take(&mut *self.subscribers.lock().unwrap_or_else(|p| p.into_inner()));
        for subscriber in subscribers {
            subscriber.on_complete();
        }
    }
}

#[derive(Debug)]
struct TerminalMessage(String);

impl std::fmt::Display for TerminalMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for TerminalMessage {}

impl<T> Publisher<T> for DirectProcessor<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        subscriber.on_subscribe(Arc::new(CancelledSubscription));
        if self.terminated.load(Ordering::Acquire) {
            match self.terminal.lock().unwrap_or_else(|p| p.into_inner()).clone() {
                Some(Terminal::Complete) => subscriber.on_complete(),
                Some(Terminal::Error(msg)) => {
                    subscriber.on_error(Error::upstream(TerminalMessage(msg)))
                }
                None => {}
            }
            return;
        }
        self.subscribers
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(subscriber);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingSubscriber;

    #[test]
    fn broadcasts_to_every_subscriber() {
        let processor = DirectProcessor::new();
        let a = RecordingSubscriber::new();
        let b = RecordingSubscriber::new();
        processor.subscribe(a.clone());
        processor.subscribe(b.clone());

        processor.on_next(1);
        processor.on_next(2);

        assert_eq!(vec![1, 2], a.values());
        assert_eq!(vec![1, 2], b.values());
    }

    #[test]
    fn late_subscriber_after_complete_is_completed_immediately() {
        let processor = DirectProcessor::<i32>::new();
        processor.on_complete();

        let late = RecordingSubscriber::new();
        processor.subscribe(late.clone());

        assert!(late.is_complete());
    }

    #[test]
    fn late_subscriber_after_error_receives_the_error() {
        let processor = DirectProcessor::<i32>::new();
        processor.on_error(Error::violation(crate::error::Violation::NullValue));

        let late = RecordingSubscriber::new();
        processor.subscribe(late.clone());

        assert!(late.error().is_some());
    }

    #[test]
    fn does_not_buffer_values_for_late_subscribers() {
        let processor = DirectProcessor::new();
        processor.on_next(1);

        let late = RecordingSubscriber::new();
        processor.subscribe(late.clone());
        processor.on_next(2);

        assert_eq!(vec![2], late.values());
    }
}
