//! The `Subscriber` and `Publisher` sides of the Reactive Streams ABI.

use std::sync::Arc;

use crate::error::Error;
use crate::subscription::Subscription;

/// A source of elements of type `T`.
pub trait Publisher<T> {
    /// Start a subscription. Must deliver exactly one `on_subscribe`
    /// to `subscriber`, synchronously or asynchronously, before any
    /// other signal.
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>);
}

/// A sink for elements of type `T`, driven by demand it grants via the
/// `Subscription` it receives in `on_subscribe`.
pub trait Subscriber<T>: Send + Sync {
    /// Called exactly once, before any other signal. A second call (a
    /// protocol violation by the producer) must result in the new
    /// subscription being cancelled, not in a second subscription
    /// being retained.
    fn on_subscribe(&self, subscription: Arc<dyn Subscription<T>>);

    /// Deliver one element. Never called more times than demand was
    /// granted for.
    fn on_next(&self, value: T);

    /// Terminate with an error. At most one of `on_error`/`on_complete`
    /// is ever called, and never after the other.
    fn on_error(&self, error: Error);

    /// Terminate normally.
    fn on_complete(&self);

    /// Capability probe: does this subscriber implement
    /// [`ConditionalSubscriber::try_on_next`]? A publisher that wants
    /// to exploit conditional, demand-preserving filtering checks this
    /// before installing a conditional subscription; it never inspects
    /// the subscriber's concrete type to find out.
    fn is_conditional(&self) -> bool {
        false
    }

    /// As [`ConditionalSubscriber::try_on_next`], for subscribers that
    /// report `is_conditional() == true`. The default simply forwards
    /// to `on_next` and reports acceptance; it is never called by a
    /// well-behaved publisher unless `is_conditional()` returned
    /// `true` first.
    fn try_on_next(&self, value: T) -> bool {
        self.on_next(value);
        true
    }
}

/// Marker trait documenting the shape of a conditional subscriber. A
/// type that implements this should also override
/// [`Subscriber::is_conditional`] to return `true` and
/// [`Subscriber::try_on_next`] to forward here, so the capability is
/// visible to a publisher that only has `&dyn Subscriber<T>`.
pub trait ConditionalSubscriber<T>: Subscriber<T> {
    /// Attempt to deliver `value`. Returning `false` means the value
    /// was rejected *without* consuming any of the outstanding demand
    /// (the caller must not decrement its bounded emission budget for
    /// a rejected item).
    fn try_on_next(&self, value: T) -> bool;
}
