//! Subscriber side of a shared stream.

use crate::shared::SharedCore;
use crate::slots::SlotId;
use futures_core::Stream;
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

type Hook<T> = Box<dyn FnOnce(&mut SubscriptionSink<'_, T>) + Send>;

/// One subscriber of a shared stream.
///
/// Created by `subscribe`; the slot is registered (and the subscription
/// count bumped) at that point, before the first poll. The stream yields the
/// current replay window first and then every value the stream subsequently
/// accepts, in order and without gaps, except for values lost to a
/// drop-oldest overflow while this subscriber lagged behind.
///
/// The stream never ends: a shared stream has no terminal state. Dropping
/// the subscription detaches it, which may resume producers that were
/// suspended on this subscriber's lag.
pub struct Subscription<T: Clone> {
    core: Arc<SharedCore<T>>,
    slot: SlotId,
    hooks: Vec<Hook<T>>,
    /// Synthetic values emitted by hooks, delivered before buffered values.
    pending: VecDeque<T>,
}

impl<T: Clone> Subscription<T> {
    pub(crate) fn attach(core: Arc<SharedCore<T>>) -> Self {
        let slot = core.allocate_slot();
        Self { core, slot, hooks: Vec::new(), pending: VecDeque::new() }
    }

    /// Registers an action to run once, after this subscription is attached
    /// but before any value is drawn from the stream.
    ///
    /// The action receives a sink and may emit synthetic values; they are
    /// delivered to this subscriber ahead of everything else. Hooks stack:
    /// the action added last runs first.
    pub fn on_subscription<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&mut SubscriptionSink<'_, T>) + Send + 'static,
    {
        self.hooks.push(Box::new(hook));
        self
    }

    fn run_hooks(&mut self) {
        if self.hooks.is_empty() {
            return;
        }
        let hooks = std::mem::take(&mut self.hooks);
        let mut sink = SubscriptionSink { values: &mut self.pending };
        for hook in hooks.into_iter().rev() {
            hook(&mut sink);
        }
    }
}

impl<T: Clone> Unpin for Subscription<T> {}

impl<T: Clone> Stream for Subscription<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        let this = self.get_mut();
        this.run_hooks();
        if let Some(value) = this.pending.pop_front() {
            return Poll::Ready(Some(value));
        }
        this.core.poll_take(this.slot, cx).map(Some)
    }
}

impl<T: Clone> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.core.free_slot(self.slot);
    }
}

/// Sink handed to `on_subscription` hooks for emitting synthetic values.
pub struct SubscriptionSink<'a, T> {
    values: &'a mut VecDeque<T>,
}

impl<T> SubscriptionSink<'_, T> {
    /// Queues a synthetic value for this subscriber.
    pub fn emit(&mut self, value: T) {
        self.values.push_back(value);
    }
}
