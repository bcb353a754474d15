//! Property-based tests for the shared-stream invariants.
//!
//! Each case drives one stream through a random sequence of emissions,
//! subscriptions, polls, unsubscriptions and replay resets, polling by hand
//! with a noop waker so every interleaving is deterministic, then checks the
//! observable invariants.

use futures::task::noop_waker_ref;
use proptest::prelude::*;
use replaycast::{
    MutableSharedStream, OverflowPolicy, SharedConfig, StreamExt, Subscription,
};
use std::future::Future;
use std::task::{Context, Poll};

#[derive(Debug, Clone)]
enum Op {
    Emit,
    Subscribe,
    Poll(usize),
    Unsubscribe(usize),
    Reset,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => Just(Op::Emit),
        2 => Just(Op::Subscribe),
        5 => (0usize..4).prop_map(Op::Poll),
        1 => (0usize..4).prop_map(Op::Unsubscribe),
        1 => Just(Op::Reset),
    ]
}

fn overflow_strategy() -> impl Strategy<Value = OverflowPolicy> {
    prop_oneof![
        Just(OverflowPolicy::Suspend),
        Just(OverflowPolicy::DropOldest),
        Just(OverflowPolicy::DropLatest),
    ]
}

fn try_next(sub: &mut Subscription<u32>) -> Option<u32> {
    let mut cx = Context::from_waker(noop_waker_ref());
    let next = sub.next();
    let mut next = std::pin::pin!(next);
    match next.as_mut().poll(&mut cx) {
        Poll::Ready(value) => value,
        Poll::Pending => None,
    }
}

proptest! {
    /// Replay stays bounded, observations are strictly increasing, and under
    /// the suspending policy every subscriber sees a contiguous run of the
    /// accepted values.
    #[test]
    fn prop_random_op_sequences_keep_invariants(
        replay in 0usize..4,
        extra in 0usize..4,
        overflow in overflow_strategy(),
        ops in prop::collection::vec(op_strategy(), 1..100),
    ) {
        let config = SharedConfig::new(replay)
            .with_extra_buffer(extra)
            .with_overflow(overflow);
        prop_assume!(config.validate().is_ok());
        let stream = MutableSharedStream::new(config).expect("validated");

        let mut next_value: u32 = 0;
        let mut accepted: Vec<u32> = Vec::new();
        let mut subs: Vec<(Subscription<u32>, Vec<u32>)> = Vec::new();

        for op in ops {
            match op {
                Op::Emit => {
                    let result = stream.try_emit(next_value);
                    if overflow != OverflowPolicy::Suspend {
                        prop_assert!(result.is_ok(), "only suspend may reject");
                    }
                    if result.is_ok() {
                        accepted.push(next_value);
                    }
                    next_value += 1;
                }
                Op::Subscribe => {
                    if subs.len() < 4 {
                        subs.push((stream.subscribe(), Vec::new()));
                    }
                }
                Op::Poll(pick) => {
                    if !subs.is_empty() {
                        let pick = pick % subs.len();
                        let (sub, seen) = &mut subs[pick];
                        if let Some(value) = try_next(sub) {
                            seen.push(value);
                        }
                    }
                }
                Op::Unsubscribe(pick) => {
                    if !subs.is_empty() {
                        let pick = pick % subs.len();
                        subs.swap_remove(pick);
                    }
                }
                Op::Reset => {
                    stream.reset_replay();
                    let after_first = stream.replay_snapshot();
                    stream.reset_replay();
                    prop_assert_eq!(&after_first, &stream.replay_snapshot(), "reset is idempotent");
                }
            }
            prop_assert!(
                stream.replay_snapshot().len() <= replay,
                "replay window exceeded its capacity"
            );
        }

        for (_, seen) in &subs {
            for pair in seen.windows(2) {
                prop_assert!(pair[0] < pair[1], "observations regressed: {:?}", seen);
            }
            // Dropping policies may skip values, the suspending one may not.
            if overflow == OverflowPolicy::Suspend {
                if let Some(first) = seen.first() {
                    let start = accepted
                        .iter()
                        .position(|value| value == first)
                        .expect("observed value was accepted");
                    prop_assert_eq!(
                        &accepted[start..start + seen.len()],
                        &seen[..],
                        "gap in a suspend-policy subscription"
                    );
                }
            }
        }
    }

    /// A fresh subscriber drains exactly the current replay snapshot before
    /// it would suspend.
    #[test]
    fn prop_new_subscriber_observes_replay_snapshot(
        replay in 0usize..5,
        values in prop::collection::vec(any::<u32>(), 0..24),
    ) {
        let stream = MutableSharedStream::new(SharedConfig::new(replay)).expect("valid");
        for value in values {
            stream.try_emit(value).expect("no subscribers attached");
        }

        let snapshot = stream.replay_snapshot();
        let mut sub = stream.subscribe();
        let mut seen = Vec::new();
        while let Some(value) = try_next(&mut sub) {
            seen.push(value);
        }
        prop_assert_eq!(seen, snapshot);
    }

    /// The replay window holds the suffix of what was emitted while nobody
    /// was attached.
    #[test]
    fn prop_replay_window_is_latest_suffix(
        replay in 1usize..5,
        count in 0usize..24,
    ) {
        let stream = MutableSharedStream::new(SharedConfig::new(replay)).expect("valid");
        for value in 0..count as u32 {
            stream.try_emit(value).expect("no subscribers attached");
        }

        let expected: Vec<u32> = (0..count as u32).rev().take(replay).rev().collect();
        prop_assert_eq!(stream.replay_snapshot(), expected);
    }
}
