//! Event callbacks: per-connection update [`Observer`]s, per-provider
//! [`OnClearCallback`] veto hooks, and the security-event reporter. All
//! three are injected `dyn`-callable objects — at most one observer per
//! connection, at most one clear-callback per provider uuid. Callbacks
//! must be non-blocking and must not reentrantly call back into the
//! engine; a thread-local guard turns a violation into a panic rather
//! than a silent deadlock.

use std::cell::Cell;

use crypto_daemon_types::ids::{SlotNumber, UserId, Uuid};

/// The operation a security event reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportedOperation {
    /// `open_as_user`.
    OpenAsUser,
    /// `open_as_owner`.
    OpenAsOwner,
    /// `save_copy`.
    SaveCopy,
    /// `clear`.
    Clear,
}

/// The outcome of a reported operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportedOutcome {
    /// The operation succeeded.
    Allowed,
    /// The operation was denied; carries the wire error code name.
    Denied(&'static str),
}

/// A single security event: `(user, slot, operation, outcome)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurityEvent {
    /// The caller.
    pub user: UserId,
    /// The slot acted upon.
    pub slot: SlotNumber,
    /// The operation attempted.
    pub operation: ReportedOperation,
    /// The result.
    pub outcome: ReportedOutcome,
}

/// Receives security events when IDSM reporting (`server.idsmReporting`) is
/// enabled.
pub trait SecurityEventReporter: Send + Sync {
    /// Reports one event. Must not block and must not call back into the
    /// engine.
    fn report(&self, event: SecurityEvent);
}

/// Receives notifications when a subscribed slot's content changes.
/// Exactly one observer may be registered per connection at a time;
/// registering a new one returns (and displaces) the previous one.
pub trait Observer: Send + Sync {
    /// Called after a `save_copy` or `clear` commits against a slot this
    /// observer's connection has subscribed to via `open_as_user(...,
    /// subscribe = true)`.
    fn on_slot_updated(&self, slot: SlotNumber);
}

/// A provider-scoped veto hook invoked before `clear` removes a slot's
/// content. Returning `false` vetoes the clear (the engine reports
/// `RuntimeFault`). At most one callback may be registered per provider
/// uuid; registering a new one replaces the old.
pub trait OnClearCallback: Send + Sync {
    /// Returns `true` to allow the clear, `false` to veto it.
    fn on_clear(&self, slot: SlotNumber, provider_uuid: Uuid) -> bool;
}

thread_local! {
    static IN_CALLBACK: Cell<bool> = Cell::new(false);
}

/// Runs `f` with the reentrancy guard held, panicking if a callback is
/// already running on this thread (i.e. `f`'s callback tried to call back
/// into the engine instead of returning promptly).
///
/// # Panics
/// Panics if called while already inside a callback invocation on this
/// thread.
#[allow(clippy::panic)] // a reentrant callback must panic/abort, not deadlock
pub fn run_guarded<R>(f: impl FnOnce() -> R) -> R {
    IN_CALLBACK.with(|flag| {
        if flag.get() {
            panic!("reentrant call into the key-storage engine from an observer/clear callback");
        }
        flag.set(true);
    });
    struct ResetGuard;
    impl Drop for ResetGuard {
        fn drop(&mut self) {
            IN_CALLBACK.with(|flag| flag.set(false));
        }
    }
    let _guard = ResetGuard;
    f()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "reentrant")]
    fn nested_guarded_calls_panic() {
        run_guarded(|| {
            run_guarded(|| {});
        });
    }

    #[test]
    fn sequential_guarded_calls_do_not_panic() {
        run_guarded(|| {});
        run_guarded(|| {});
    }
}
