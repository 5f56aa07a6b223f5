//! The dynamic re-subscribing operator: retries the upstream publisher
//! whenever a user-supplied function decides to, based on a companion
//! publisher of the errors the upstream has raised.
//!
//! The moving parts are, in the language of `DESIGN.md`'s grounding
//! ledger: a [`DirectProcessor`] companion carrying errors out to the
//! user's handler, a [`MultiSubscriptionSubscriber`]-backed
//! `MainSubscriber` that is simultaneously the `Subscriber<T>` the
//! source sees and the `Subscription<T>` the downstream sees, and an
//! `OtherSubscriber` that watches the handler's returned publisher and
//! drives re-subscription.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::direct_processor::DirectProcessor;
use crate::dropped::{self, DroppedSignal};
use crate::error::{Error, Violation};
use crate::fuse::FusionMode;
use crate::multi::MultiSubscriptionSubscriber;
use crate::serialized::SerializedSubscriber;
use crate::subscriber::{Publisher, Subscriber};
use crate::subscription::Subscription;

/// The type carried by the companion publisher: a shared handle to an
/// upstream error. `Arc` rather than `Error` directly, since the
/// companion may be observed by more than one downstream stage in the
/// user's handler and `Error` itself does not implement `Clone`.
pub type ErrorSignal = Arc<Error>;

/// Decorates `source` with a function that decides, based on a
/// companion publisher of the errors `source` raises, whether and when
/// to resubscribe.
///
/// `handler` returns `None` to signal that no companion publisher is
/// available (surfaced as a `NullCompanion` protocol violation); a
/// panic inside it is caught and surfaced as `on_error` rather than
/// unwinding through `subscribe`.
pub struct RetryWhen<T> {
    source: Arc<dyn Publisher<T> + Send + Sync>,
    handler: Box<
        dyn Fn(Arc<dyn Publisher<ErrorSignal>>) -> Option<Arc<dyn Publisher<()>>> + Send + Sync,
    >,
}

impl<T> RetryWhen<T>
where
    T: Send + Sync + 'static,
{
    /// Build a retry-when operator over `source`, deciding
    /// resubscription via `handler`.
    pub fn new<P, F>(source: P, handler: F) -> Self
    where
        P: Publisher<T> + Send + Sync + 'static,
        F: Fn(Arc<dyn Publisher<ErrorSignal>>) -> Option<Arc<dyn Publisher<()>>>
            + Send
            + Sync
            + 'static,
    {
        RetryWhen {
            source: Arc::new(source),
            handler: Box::new(handler),
        }
    }
}

/// The error a panicking `handler` is wrapped in before being surfaced
/// to the downstream subscriber.
#[derive(Debug)]
struct HandlerPanicked(String);

impl std::fmt::Display for HandlerPanicked {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "retry-when handler panicked: {}", self.0)
    }
}

impl std::error::Error for HandlerPanicked {}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked with a non-string payload".to_string()
    }
}

impl<T> Publisher<T> for RetryWhen<T>
where
    T: Send + Sync + 'static,
{
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        log::debug!("retry-when: new subscription");
        let companion = DirectProcessor::<ErrorSignal>::new();
        let downstream = Arc::new(SerializedSubscriber::new(subscriber));

        let main = Arc::new(MainSubscriber {
            downstream: downstream.clone(),
            multi: MultiSubscriptionSubscriber::new(),
            companion_arbiter: crate::arbiter::DeferredSubscriptionArbiter::new(),
            companion: companion.clone(),
            source: self.source.clone(),
            terminated: AtomicBool::new(false),
            resubscribe_wip: AtomicUsize::new(0),
        });

        downstream.on_subscribe(main.clone());

        let companion_view: Arc<dyn Publisher<ErrorSignal>> = companion;
        let handler = &self.handler;
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            handler(companion_view)
        }));

        let other_publisher = match outcome {
            Ok(Some(publisher)) => publisher,
            Ok(None) => {
                log::debug!("retry-when: handler returned no companion publisher");
                if !main.terminated.swap(true, Ordering::AcqRel) {
                    downstream.on_error(Error::violation(Violation::NullCompanion));
                }
                return;
            }
            Err(payload) => {
                let message = panic_message(payload);
                log::debug!("retry-when: handler panicked: {}", message);
                if !main.terminated.swap(true, Ordering::AcqRel) {
                    downstream.on_error(Error::upstream(HandlerPanicked(message)));
                }
                return;
            }
        };

        if main.terminated.load(Ordering::Acquire) {
            return;
        }

        let other: Arc<dyn Subscriber<()>> = Arc::new(OtherSubscriber { main: main.clone() });
        other_publisher.subscribe(other);

        if !main.terminated.load(Ordering::Acquire) {
            log::debug!("retry-when: subscribing to source");
            main.source.subscribe(main.clone());
        }
    }
}

struct MainSubscriber<T> {
    downstream: Arc<SerializedSubscriber<T>>,
    multi: MultiSubscriptionSubscriber<T>,
    companion_arbiter: crate::arbiter::DeferredSubscriptionArbiter<()>,
    companion: Arc<DirectProcessor<ErrorSignal>>,
    source: Arc<dyn Publisher<T> + Send + Sync>,
    terminated: AtomicBool,
    resubscribe_wip: AtomicUsize,
}

impl<T> MainSubscriber<T>
where
    T: Send + Sync + 'static,
{
    /// Drain-guarded resubscription: the thread that observes the
    /// work counter transition `0 -> 1` performs the resubscribe (and
    /// repeats if another `onNext` from the companion landed while it
    /// was doing so); everyone else just bumps the counter and
    /// returns. Guards against two overlapping resubscriptions if the
    /// companion emits reentrantly.
    fn resubscribe(self: &Arc<Self>) {
        if self.resubscribe_wip.fetch_add(1, Ordering::AcqRel) != 0 {
            log::trace!("retry-when: resubscribe already in flight, deferring");
            return;
        }
        loop {
            if !self.terminated.load(Ordering::Acquire) {
                log::debug!("retry-when: resubscribing to source");
                self.source.subscribe(self.clone());
            }
            if self.resubscribe_wip.fetch_sub(1, Ordering::AcqRel) == 1 {
                break;
            }
        }
    }
}

impl<T> Subscription<T> for MainSubscriber<T>
where
    T: Send + Sync + 'static,
{
    fn request(&self, n: u64) {
        self.multi.subscription().request(n);
    }

    fn cancel(&self) {
        if self.terminated.swap(true, Ordering::AcqRel) {
            return;
        }
        log::debug!("retry-when: cancelled");
        self.multi.cancel();
        self.companion_arbiter.cancel();
    }

    fn try_fuse(&self, _requested: FusionMode) -> FusionMode {
        FusionMode::None
    }
}

impl<T> Subscriber<T> for MainSubscriber<T>
where
    T: Send + Sync + 'static,
{
    fn on_subscribe(&self, subscription: Arc<dyn Subscription<T>>) {
        self.multi.set(Box::new(subscription));
    }

    fn on_next(&self, value: T) {
        self.downstream.on_next(value);
        self.multi.produced(1);
    }

    fn on_error(&self, error: Error) {
        if self.terminated.load(Ordering::Acquire) {
            dropped::report(DroppedSignal::<T>::Error(error));
            return;
        }
        log::trace!("retry-when: source raised {}, consulting companion", error);
        self.multi.fold_pending();
        self.companion_arbiter.request(1);
        self.companion.on_next(Arc::new(error));
    }

    fn on_complete(&self) {
        if self.terminated.swap(true, Ordering::AcqRel) {
            return;
        }
        log::debug!("retry-when: source completed");
        self.companion_arbiter.cancel();
        self.downstream.on_complete();
    }
}

struct OtherSubscriber<T> {
    main: Arc<MainSubscriber<T>>,
}

impl<T> Subscriber<()> for OtherSubscriber<T>
where
    T: Send + Sync + 'static,
{
    fn on_subscribe(&self, subscription: Arc<dyn Subscription<()>>) {
        self.main.companion_arbiter.set(Box::new(subscription));
    }

    fn on_next(&self, _value: ()) {
        self.main.resubscribe();
    }

    fn on_error(&self, error: Error) {
        // Once the source has completed normally, `main.terminated` is
        // already set and this arrives after the fact: ignore it per
        // the reference behaviour of not re-surfacing a companion
        // error after a normal completion.
        if self.main.terminated.swap(true, Ordering::AcqRel) {
            dropped::report(DroppedSignal::<()>::Error(error));
            return;
        }
        self.main.multi.cancel();
        self.main.downstream.on_error(error);
    }

    fn on_complete(&self) {
        if self.main.terminated.swap(true, Ordering::AcqRel) {
            return;
        }
        self.main.multi.cancel();
        self.main.downstream.on_complete();
    }
}
