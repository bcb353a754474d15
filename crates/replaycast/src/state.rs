//! State streams: single-value shared streams with distinct emissions.
//!
//! A state stream is a shared stream in its degenerate configuration
//! (replay 1, no extra buffer, drop-oldest, mandatory initial value) plus
//! equality-gated writes: setting the current value again is a no-op.

use crate::shared::{MutableSharedStream, SharedStream};
use crate::subscription::Subscription;
use tokio::sync::watch;

/// Writable handle to a state stream.
///
/// Clones refer to the same stream. There is always a current value;
/// subscribers observe it immediately and then every distinct update.
pub struct MutableStateStream<T: Clone + PartialEq> {
    inner: MutableSharedStream<T>,
}

impl<T: Clone + PartialEq> Clone for MutableStateStream<T> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

/// Read-only view of a state stream.
pub struct StateStream<T: Clone + PartialEq> {
    inner: SharedStream<T>,
}

impl<T: Clone + PartialEq> Clone for StateStream<T> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<T: Clone + PartialEq> MutableStateStream<T> {
    /// Creates a state stream holding `initial`.
    pub fn new(initial: T) -> Self {
        Self { inner: MutableSharedStream::state_configured(initial) }
    }

    /// Snapshot of the current value.
    pub fn value(&self) -> T {
        // The replay window of a state stream is never empty: it is seeded at
        // construction, kept at one entry by drop-oldest, and re-seeded by
        // reset_replay.
        self.inner.latest_value().expect("state stream holds a value")
    }

    /// Replaces the current value.
    ///
    /// Returns `false` without emitting when `value` equals the current one.
    pub fn set_value(&self, value: T) -> bool {
        self.inner.emit_distinct(value)
    }

    /// Attaches a subscriber; it observes the current value first.
    pub fn subscribe(&self) -> Subscription<T> {
        self.inner.subscribe()
    }

    /// Restores the initial value as the current one.
    pub fn reset_replay(&self) {
        self.inner.reset_replay();
    }

    /// Observable number of active subscribers.
    pub fn subscription_count(&self) -> watch::Receiver<usize> {
        self.inner.subscription_count()
    }

    /// Read-only view of this stream.
    pub fn read_only(&self) -> StateStream<T> {
        StateStream { inner: self.inner.read_only() }
    }
}

impl<T: Clone + PartialEq> StateStream<T> {
    /// Snapshot of the current value.
    pub fn value(&self) -> T {
        self.inner.latest().expect("state stream holds a value")
    }

    /// Attaches a subscriber; it observes the current value first.
    pub fn subscribe(&self) -> Subscription<T> {
        self.inner.subscribe()
    }

    /// Observable number of active subscribers.
    pub fn subscription_count(&self) -> watch::Receiver<usize> {
        self.inner.subscription_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_tracks_distinct_updates() {
        let state = MutableStateStream::new(0);
        assert_eq!(state.value(), 0);

        assert!(!state.set_value(0));
        assert!(state.set_value(1));
        assert!(!state.set_value(1));
        assert!(state.set_value(2));
        assert_eq!(state.value(), 2);
    }

    #[test]
    fn test_reset_restores_initial() {
        let state = MutableStateStream::new(7);
        state.set_value(8);
        assert_eq!(state.value(), 8);
        state.reset_replay();
        assert_eq!(state.value(), 7);
    }

    #[test]
    fn test_read_only_view_shares_state() {
        let state = MutableStateStream::new("a");
        let view = state.read_only();
        state.set_value("b");
        assert_eq!(view.value(), "b");
    }
}
