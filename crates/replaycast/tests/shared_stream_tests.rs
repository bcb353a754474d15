//! Integration tests for shared streams.
//!
//! Most tests poll futures by hand with a noop waker so that interleavings
//! are fully deterministic; the tokio tests at the bottom exercise the real
//! waker plumbing.

use futures::task::noop_waker_ref;
use replaycast::{
    MutableSharedStream, OverflowPolicy, SharedConfig, StreamExt, Subscription,
};
use std::fmt::Debug;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

fn shared<T: Clone>(replay: usize, extra: usize, overflow: OverflowPolicy) -> MutableSharedStream<T> {
    MutableSharedStream::new(
        SharedConfig::new(replay)
            .with_extra_buffer(extra)
            .with_overflow(overflow),
    )
    .expect("valid config")
}

/// Polls the subscription once; `None` means it would suspend.
fn try_next<T: Clone>(sub: &mut Subscription<T>) -> Option<T> {
    let mut cx = Context::from_waker(noop_waker_ref());
    let next = sub.next();
    let mut next = std::pin::pin!(next);
    match next.as_mut().poll(&mut cx) {
        Poll::Ready(value) => value,
        Poll::Pending => None,
    }
}

fn assert_next<T: Clone + PartialEq + Debug>(sub: &mut Subscription<T>, expected: T) {
    match try_next(sub) {
        Some(value) => assert_eq!(value, expected),
        None => panic!("expected {expected:?}, but the subscription would suspend"),
    }
}

fn poll_once<F: Future>(future: &mut Pin<Box<F>>) -> Poll<F::Output> {
    let mut cx = Context::from_waker(noop_waker_ref());
    future.as_mut().poll(&mut cx)
}

// ---------------------------------------------------------------------
// Replay and late subscribers
// ---------------------------------------------------------------------

#[test]
fn test_zero_replay_emission_before_subscribers_is_lost() {
    let stream = shared(0, 16, OverflowPolicy::Suspend);
    stream.try_emit("OK").expect("no subscribers, nothing blocks");

    let mut subs: Vec<_> = (0..10).map(|_| stream.subscribe()).collect();
    for sub in &mut subs {
        assert_eq!(try_next(sub), None);
    }
    assert!(stream.replay_snapshot().is_empty());
}

#[test]
fn test_late_subscribers_observe_replay_then_live_values() {
    let stream = shared(1, 16, OverflowPolicy::Suspend);

    let mut a = stream.subscribe();
    stream.try_emit("OK").expect("buffer has room");
    assert_next(&mut a, "OK");

    // Attach after "OK" but before "DONE".
    let mut late: Vec<_> = (0..9).map(|_| stream.subscribe()).collect();
    stream.try_emit("DONE").expect("buffer has room");

    assert_next(&mut a, "DONE");
    for sub in &mut late {
        assert_next(sub, "OK");
        assert_next(sub, "DONE");
    }
}

#[test]
fn test_replay_snapshot_matches_late_subscriber_view() {
    let stream = shared(3, 0, OverflowPolicy::Suspend);
    for value in 0..7 {
        stream.try_emit(value).expect("no subscribers");
    }
    assert_eq!(stream.replay_snapshot(), vec![4, 5, 6]);

    let mut sub = stream.subscribe();
    assert_next(&mut sub, 4);
    assert_next(&mut sub, 5);
    assert_next(&mut sub, 6);
    assert_eq!(try_next(&mut sub), None);
}

// ---------------------------------------------------------------------
// Overflow policies
// ---------------------------------------------------------------------

#[test]
fn test_drop_oldest_snaps_slow_subscriber_forward() {
    let stream = shared(0, 2, OverflowPolicy::DropOldest);
    let mut slow = stream.subscribe();

    for value in 0..10 {
        stream.try_emit(value).expect("drop-oldest never rejects");
    }

    // Seven values were lost to the slow subscriber; the buffer holds 8, 9.
    assert_next(&mut slow, 8);
    assert_next(&mut slow, 9);
    assert_eq!(try_next(&mut slow), None);
}

#[test]
fn test_drop_latest_discards_incoming_value() {
    let stream = shared(0, 1, OverflowPolicy::DropLatest);
    let mut sub = stream.subscribe();

    stream.try_emit(1).expect("buffer has room");
    stream.try_emit(2).expect("drop-latest reports success");

    assert_next(&mut sub, 1);
    assert_eq!(try_next(&mut sub), None);

    stream.try_emit(3).expect("buffer has room again");
    assert_next(&mut sub, 3);
}

#[test]
fn test_suspend_policy_rejects_try_emit_when_blocked() {
    let stream = shared(0, 1, OverflowPolicy::Suspend);
    let _sub = stream.subscribe();

    stream.try_emit(1).expect("buffer has room");
    assert_eq!(stream.try_emit(2), Err(2));
}

// ---------------------------------------------------------------------
// Suspended producers
// ---------------------------------------------------------------------

#[test]
fn test_emit_suspends_until_consumer_frees_space() {
    let stream = shared(0, 1, OverflowPolicy::Suspend);
    let mut sub = stream.subscribe();

    stream.try_emit(1).expect("buffer has room");
    let mut emit = Box::pin(stream.emit(2));
    assert!(poll_once(&mut emit).is_pending());

    assert_next(&mut sub, 1);
    assert!(poll_once(&mut emit).is_ready());
    assert_next(&mut sub, 2);
}

#[test]
fn test_unsubscribe_resumes_suspended_producer() {
    let stream = shared(0, 1, OverflowPolicy::Suspend);
    let slow = stream.subscribe();
    let mut fast = stream.subscribe();

    stream.try_emit(1).expect("buffer has room");
    let mut emit = Box::pin(stream.emit(2));
    assert!(poll_once(&mut emit).is_pending());

    assert_next(&mut fast, 1);
    // The slow subscriber still pins the buffer.
    assert!(poll_once(&mut emit).is_pending());

    drop(slow);
    assert!(poll_once(&mut emit).is_ready());
    assert_next(&mut fast, 2);
}

#[test]
fn test_cancelled_emitter_is_skipped() {
    let stream = shared(0, 0, OverflowPolicy::Suspend);

    let mut emits: Vec<_> = (1..=5).map(|value| Box::pin(stream.emit(value))).collect();
    for emit in &mut emits {
        assert!(poll_once(emit).is_pending());
    }

    // Cancel the third producer while it waits in the queue.
    let third = emits.remove(2);
    drop(third);

    let mut sub = stream.subscribe();
    let mut seen = Vec::new();
    for _ in 0..4 {
        match try_next(&mut sub) {
            Some(value) => seen.push(value),
            None => panic!("queued value missing, saw {seen:?}"),
        }
    }
    assert_eq!(seen, vec![1, 2, 4, 5]);
    assert_eq!(try_next(&mut sub), None);

    for emit in &mut emits {
        assert!(poll_once(emit).is_ready());
    }
}

// ---------------------------------------------------------------------
// Rendezvous mode
// ---------------------------------------------------------------------

#[test]
fn test_rendezvous_try_emit() {
    let stream = shared(0, 0, OverflowPolicy::Suspend);
    // Nothing is listening: the value is forgotten but accepted.
    stream.try_emit(1).expect("no subscribers");

    let _sub = stream.subscribe();
    // A subscriber is listening: delivery needs a suspended hand-off.
    assert_eq!(stream.try_emit(2), Err(2));
}

#[test]
fn test_rendezvous_hand_off_delivers_exactly_once() {
    let stream = shared(0, 0, OverflowPolicy::Suspend);
    let mut sub = stream.subscribe();

    let mut emit = Box::pin(stream.emit(7));
    assert!(poll_once(&mut emit).is_pending());

    assert_next(&mut sub, 7);
    assert!(poll_once(&mut emit).is_ready());
    assert_eq!(try_next(&mut sub), None);
    assert!(stream.replay_snapshot().is_empty());
}

// ---------------------------------------------------------------------
// Subscription hooks
// ---------------------------------------------------------------------

#[test]
fn test_on_subscription_emits_before_replay() {
    let stream = shared(1, 1, OverflowPolicy::Suspend);
    stream.try_emit("replayed").expect("no subscribers");

    let mut sub = stream
        .subscribe()
        .on_subscription(|sink| sink.emit("inner"))
        .on_subscription(|sink| sink.emit("outer"));

    // The hook added last wraps the others and runs first.
    assert_next(&mut sub, "outer");
    assert_next(&mut sub, "inner");
    assert_next(&mut sub, "replayed");
    assert_eq!(try_next(&mut sub), None);
}

#[test]
fn test_subscription_registers_before_hooks_run() {
    let stream = shared(1, 1, OverflowPolicy::Suspend);
    let count = stream.subscription_count();

    // Counted at attach time, before the first poll runs any hook.
    let mut sub = stream.subscribe().on_subscription(|sink| sink.emit(1));
    assert_eq!(*count.borrow(), 1);

    stream.try_emit(2).expect("buffer has room");
    assert_next(&mut sub, 1);
    assert_next(&mut sub, 2);
}

// ---------------------------------------------------------------------
// Replay reset
// ---------------------------------------------------------------------

#[test]
fn test_reset_replay_only_affects_future_subscribers() {
    let stream = shared(2, 0, OverflowPolicy::Suspend);
    let mut early = stream.subscribe();
    stream.try_emit(1).expect("buffer has room");
    stream.try_emit(2).expect("buffer has room");

    stream.reset_replay();
    assert!(stream.replay_snapshot().is_empty());

    // The attached subscriber still drains what it already had in view.
    assert_next(&mut early, 1);
    assert_next(&mut early, 2);

    let mut late = stream.subscribe();
    assert_eq!(try_next(&mut late), None);
}

#[test]
fn test_reset_replay_reseeds_initial_and_keeps_queued_emitter() {
    let stream = MutableSharedStream::with_initial(SharedConfig::new(1), 0).expect("valid");
    let mut sub = stream.subscribe();

    // The initial value fills the single buffer slot, so this emit parks.
    let mut emit = Box::pin(stream.emit(1));
    assert!(poll_once(&mut emit).is_pending());

    stream.reset_replay();
    assert!(poll_once(&mut emit).is_pending());

    assert_next(&mut sub, 0);
    assert!(poll_once(&mut emit).is_ready());
    assert_next(&mut sub, 1);
}

// ---------------------------------------------------------------------
// Waker plumbing under a real runtime
// ---------------------------------------------------------------------

#[tokio::test]
async fn test_waiting_subscriber_is_woken_by_emission() {
    let stream = shared(0, 4, OverflowPolicy::Suspend);
    let mut sub = stream.subscribe();

    let reader = tokio::spawn(async move { sub.next().await });
    tokio::task::yield_now().await;

    stream.try_emit(5).expect("buffer has room");
    let value = tokio::time::timeout(Duration::from_secs(2), reader)
        .await
        .expect("subscriber was not woken")
        .expect("reader task failed");
    assert_eq!(value, Some(5));
}

#[tokio::test]
async fn test_suspended_producer_is_woken_by_consumption() {
    let stream = shared(0, 1, OverflowPolicy::Suspend);
    let mut sub = stream.subscribe();
    stream.try_emit(1).expect("buffer has room");

    let producer = {
        let stream = stream.clone();
        tokio::spawn(async move { stream.emit(2).await })
    };
    tokio::task::yield_now().await;

    let first = tokio::time::timeout(Duration::from_secs(2), sub.next())
        .await
        .expect("first value missing");
    assert_eq!(first, Some(1));
    let second = tokio::time::timeout(Duration::from_secs(2), sub.next())
        .await
        .expect("second value missing");
    assert_eq!(second, Some(2));

    tokio::time::timeout(Duration::from_secs(2), producer)
        .await
        .expect("producer was not woken")
        .expect("producer task failed");
}
