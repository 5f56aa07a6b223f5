//! The `Subscription` side of the Reactive Streams ABI, plus the
//! small set of subscription shapes every operator in this crate's
//! family needs: a cancelled sentinel and `request(n)` validation.

use std::sync::Arc;

use crate::error::{Error, Violation};
use crate::fuse::FusionMode;
use crate::subscriber::Subscriber;

/// A live or terminated link between a subscriber and the producer
/// serving it.
///
/// Implementors additionally pick up [`FusedSubscription`]'s default,
/// no-op fusion methods for free; a source that supports synchronous
/// fusion overrides `try_fuse` and the four polling methods. This is
/// the "small, explicit capability discovery" the engine uses in place
/// of runtime type reflection: a downstream negotiates fusion by
/// calling `try_fuse` and inspecting the mode it is handed back,
/// rather than probing the concrete type of the subscription.
pub trait Subscription<T>: Send + Sync {
    /// Request up to `n` more elements. `n == 0` is a protocol
    /// violation and must be reported to the subscriber via
    /// `on_error`, not silently ignored.
    fn request(&self, n: u64);

    /// Stop delivery. Idempotent; may race with in-flight signals.
    fn cancel(&self);

    /// Negotiate a fusion mode. The default grants nothing.
    fn try_fuse(&self, _requested: FusionMode) -> FusionMode {
        FusionMode::None
    }

    /// `true` if no value is currently available. Only meaningful
    /// after a successful `try_fuse`.
    fn is_empty(&self) -> bool {
        true
    }

    /// Take the next value, if any. Only meaningful after a successful
    /// `try_fuse` and a prior `is_empty() == false`.
    fn poll(&self) -> Option<T> {
        None
    }

    /// Discard any buffered values without consuming them.
    fn clear(&self) {}

    /// Best-effort count of buffered values.
    fn size(&self) -> usize {
        0
    }
}

/// A subscription that was never backed by a real producer: it reports
/// itself cancelled from the start and does nothing on `request`.
///
/// Used as the `onSubscribe` argument when a publisher must terminate
/// a subscriber before a real subscription exists (for example, an
/// iterable source whose `hasNext()` call itself fails).
#[derive(Debug, Clone, Copy, Default)]
pub struct CancelledSubscription;

impl<T> Subscription<T> for CancelledSubscription {
    fn request(&self, _n: u64) {}
    fn cancel(&self) {}
}

impl<T, S> Subscription<T> for Arc<S>
where
    S: Subscription<T> + ?Sized,
{
    fn request(&self, n: u64) {
        (**self).request(n)
    }
    fn cancel(&self) {
        (**self).cancel()
    }
    fn try_fuse(&self, requested: FusionMode) -> FusionMode {
        (**self).try_fuse(requested)
    }
    fn is_empty(&self) -> bool {
        (**self).is_empty()
    }
    fn poll(&self) -> Option<T> {
        (**self).poll()
    }
    fn clear(&self) {
        (**self).clear()
    }
    fn size(&self) -> usize {
        (**self).size()
    }
}

/// Validate a `request(n)` call. On failure, reports a
/// `NonPositiveRequest` protocol violation to `subscriber` and returns
/// `false`; the caller must not proceed to add the (invalid) demand.
pub fn validate_request<T>(n: u64, subscriber: &Arc<dyn Subscriber<T>>) -> bool
where
    T: 'static,
{
    if crate::demand::validate(n) {
        true
    } else {
        log::warn!("request(n) called with n = {}", n);
        subscriber.on_error(Error::violation(Violation::NonPositiveRequest));
        false
    }
}

/// Validate an `on_subscribe` call against whether a subscriber already
/// holds an active subscription.
///
/// If `already_subscribed` is `true`, `subscription` is cancelled and a
/// `DoubleSubscription` protocol violation is reported to `subscriber`;
/// the caller must not install `subscription` in that case. Otherwise
/// returns `true` and the caller is free to install it.
pub fn validate_subscribe<T>(
    already_subscribed: bool,
    subscription: &Arc<dyn Subscription<T>>,
    subscriber: &dyn Subscriber<T>,
) -> bool
where
    T: 'static,
{
    if already_subscribed {
        log::warn!("on_subscribe called more than once");
        subscription.cancel();
        subscriber.on_error(Error::violation(Violation::DoubleSubscription));
        false
    } else {
        true
    }
}
