//! A Reactive Streams compliant publisher runtime: the four-signal
//! `Publisher`/`Subscriber`/`Subscription` contract, the demand
//! accounting and subscription-arbitration machinery every operator in
//! this crate is built from, and two operator shapes on top of it — an
//! iterable source with synchronous fusion, and a dynamic
//! re-subscribing `retry_when`.
//!
//! The protocol types live at the crate root (`Publisher`,
//! `Subscriber`, `Subscription`, `ConditionalSubscriber`, `Error`).
//! The scaffolding operators are built from is public under its own
//! module so a downstream operator can reuse it the way `retry_when`
//! does: [`arbiter`] for a subscription that arrives later, [`multi`]
//! for one that's swapped out repeatedly, [`serialized`] for
//! serializing concurrent signal delivery, [`demand`] for the counter
//! underlying all of it.

pub mod arbiter;
pub mod demand;
pub mod direct_processor;
pub mod dropped;
pub mod error;
pub mod fuse;
pub mod iterable;
pub mod multi;
pub mod retry_when;
pub mod serialized;
pub mod subscriber;
pub mod subscription;

#[cfg(test)]
pub(crate) mod testing;

pub use crate::arbiter::DeferredSubscriptionArbiter;
pub use crate::demand::{DemandCounter, UNBOUNDED};
pub use crate::direct_processor::DirectProcessor;
pub use crate::dropped::{reset_hook as reset_dropped_hook, set_hook as set_dropped_hook, DroppedSignal};
pub use crate::error::{Error, FatalError, Violation};
pub use crate::fuse::FusionMode;
pub use crate::iterable::IterablePublisher;
pub use crate::multi::{MultiSubscription, MultiSubscriptionSubscriber};
pub use crate::retry_when::{ErrorSignal, RetryWhen};
pub use crate::serialized::SerializedSubscriber;
pub use crate::subscriber::{ConditionalSubscriber, Publisher, Subscriber};
pub use crate::subscription::{validate_request, CancelledSubscription, Subscription};
