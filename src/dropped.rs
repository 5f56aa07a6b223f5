//! The process-wide sink for signals that arrive after a subscriber
//! has already terminated.
//!
//! Reactive Streams producers are allowed to race a final signal
//! against a consumer's cancellation; when that signal loses the race
//! it cannot be delivered (the consumer has already torn down) and
//! must not be silently discarded either. This module gives it
//! somewhere to go.

use std::fmt;
use std::sync::Mutex;

use crate::error::Error;

/// A signal that could not be delivered because its subscriber had
/// already reached a terminal state.
#[derive(Debug)]
pub enum DroppedSignal<T> {
    /// A late `on_next`.
    Next(T),
    /// A late `on_error`, or a second terminal signal racing the
    /// first.
    Error(Error),
    /// A late `on_complete`.
    Complete,
}

impl<T> fmt::Display for DroppedSignal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DroppedSignal::Next(_) => write!(f, "dropped onNext after termination"),
            DroppedSignal::Error(err) => write!(f, "dropped onError after termination: {}", err),
            DroppedSignal::Complete => write!(f, "dropped onComplete after termination"),
        }
    }
}

type Hook = Box<dyn Fn(&dyn fmt::Display) + Send + Sync>;

fn default_hook(signal: &dyn fmt::Display) {
    log::warn!("{}", signal);
}

static HOOK: Mutex<Option<Hook>> = Mutex::new(None);

/// Replace the process-wide dropped-signal hook.
///
/// The hook is invoked off the hot path (only when a signal cannot be
/// delivered), so guarding it with a mutex rather than an atomic
/// pointer swap keeps this module simple without costing anything
/// observable.
pub fn set_hook<F>(hook: F)
where
    F: Fn(&dyn fmt::Display) + Send + Sync + 'static,
{
    let mut guard = HOOK.lock().unwrap_or_else(|poison| poison.into_inner());
    *guard = Some(Box::new(hook));
}

/// Restore the default hook (log a warning via the `log` facade).
pub fn reset_hook() {
    let mut guard = HOOK.lock().unwrap_or_else(|poison| poison.into_inner());
    *guard = None;
}

/// Report a signal that could not be delivered.
pub fn report<T>(signal: DroppedSignal<T>) {
    let guard = HOOK.lock().unwrap_or_else(|poison| poison.into_inner());
    match guard.as_ref() {
        Some(hook) => hook(&signal),
        None => default_hook(&signal),
    }
}
