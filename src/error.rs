//! Crate-level error taxonomy.
//!
//! Follows this codebase's existing convention (see `cast-client`'s own
//! `Error` enums in `provider.rs` and `channel/mod.rs`) of a hand-rolled
//! `enum` implementing `std::error::Error` and `std::fmt::Display`,
//! rather than pulling in an error-handling crate.

use std::error;
use std::fmt;

/// The specific protocol rule a caller broke.
#[derive(Debug)]
pub enum Violation {
    /// `request(n)` was called with `n == 0`.
    NonPositiveRequest,
    /// `on_subscribe` was observed a second time on the same subscriber.
    DoubleSubscription,
    /// An iterator, accumulator, or other upstream source produced a
    /// `None`/null element where a value was required.
    NullValue,
    /// A retry-when companion function returned no publisher.
    NullCompanion,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::NonPositiveRequest => {
                write!(f, "request(n) called with a non-positive n")
            }
            Violation::DoubleSubscription => {
                write!(f, "onSubscribe called more than once")
            }
            Violation::NullValue => write!(f, "upstream produced a null value"),
            Violation::NullCompanion => {
                write!(f, "retry-when handler returned no companion publisher")
            }
        }
    }
}

/// Marker wrapping errors a user callback has decided must never be
/// swallowed (out-of-memory and the like are not observable from safe
/// Rust; this exists so a callback can opt an error of its own into
/// that treatment).
#[derive(Debug)]
pub struct FatalError(pub Box<dyn error::Error + Send + Sync>);

impl fmt::Display for FatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fatal error: {}", self.0)
    }
}

impl error::Error for FatalError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        Some(self.0.as_ref())
    }
}

/// Errors that can terminate a subscription.
#[derive(Debug)]
pub enum Error {
    /// An error signalled by the upstream producer.
    Upstream(Box<dyn error::Error + Send + Sync>),
    /// A Reactive Streams rule was violated by a caller.
    ProtocolViolation(Violation),
    /// An error a callback marked as non-recoverable; propagated
    /// without being folded into the normal `on_error` accounting that
    /// an accumulator-style operator would otherwise apply.
    Fatal(FatalError),
}

impl Error {
    /// Wrap an arbitrary upstream error.
    pub fn upstream<E>(err: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        Error::Upstream(Box::new(err))
    }

    /// Build a protocol-violation error of the given kind.
    pub fn violation(kind: Violation) -> Self {
        Error::ProtocolViolation(kind)
    }

    /// `true` for errors that must never be swallowed by an
    /// accumulator-style operator's fatal-error filter.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Fatal(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Upstream(err) => write!(f, "{}", err),
            Error::ProtocolViolation(kind) => write!(f, "protocol violation: {}", kind),
            Error::Fatal(err) => write!(f, "{}", err),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Upstream(err) => Some(err.as_ref()),
            Error::ProtocolViolation(_) => None,
            Error::Fatal(err) => Some(err),
        }
    }
}
