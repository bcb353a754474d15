//! The sharing driver: one task that runs a cold upstream into a shared
//! stream under the control of a start policy.

use crate::policy::{Command, StartPolicy};
use crate::upstream::ColdStream;
use async_trait::async_trait;
use futures_util::StreamExt;
use replaycast::{
    ConfigError, MutableSharedStream, MutableStateStream, SharedConfig, SharedStream, StateStream,
};
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tracing::debug;

/// Extra buffering granted to a shared upstream that carries no hint of its
/// own.
pub const DEFAULT_EXTRA_CAPACITY: usize = 64;

/// Destination a sharing driver feeds.
///
/// Implemented by [`MutableSharedStream`] (values are emitted, suspending on
/// backpressure) and [`MutableStateStream`] (values replace the current one,
/// equal values are dropped).
#[async_trait]
pub trait ShareSink<T: Send + 'static>: Clone + Send + Sync + 'static {
    /// Feeds one upstream value into the stream.
    async fn accept(&self, value: T);

    /// Erases the replay window.
    fn reset_replay(&self);

    /// Subscriber count signal handed to the start policy.
    fn subscription_count(&self) -> watch::Receiver<usize>;
}

#[async_trait]
impl<T> ShareSink<T> for MutableSharedStream<T>
where
    T: Clone + Send + 'static,
{
    async fn accept(&self, value: T) {
        self.emit(value).await;
    }

    fn reset_replay(&self) {
        MutableSharedStream::reset_replay(self);
    }

    fn subscription_count(&self) -> watch::Receiver<usize> {
        MutableSharedStream::subscription_count(self)
    }
}

#[async_trait]
impl<T> ShareSink<T> for MutableStateStream<T>
where
    T: Clone + PartialEq + Send + 'static,
{
    async fn accept(&self, value: T) {
        self.set_value(value);
    }

    fn reset_replay(&self) {
        MutableStateStream::reset_replay(self);
    }

    fn subscription_count(&self) -> watch::Receiver<usize> {
        MutableStateStream::subscription_count(self)
    }
}

/// Handle to a running sharing driver.
///
/// Dropping the handle cancels the driver, and with it any in-flight
/// upstream collection; call [`detach`](Self::detach) to let the driver run
/// unsupervised instead. The replay window is reset on every exit path.
#[derive(Debug)]
pub struct SharingHandle {
    task: Option<JoinHandle<()>>,
}

impl SharingHandle {
    fn new(task: JoinHandle<()>) -> Self {
        Self { task: Some(task) }
    }

    /// Cancels the driver.
    pub fn shutdown(&self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }

    /// `true` once the driver has finished or was cancelled.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |task| task.is_finished())
    }

    /// Waits for the driver to finish.
    ///
    /// The error carries a cancellation or a panic that escaped the upstream;
    /// subscribers never observe either.
    pub async fn join(mut self) -> Result<(), JoinError> {
        match self.task.take() {
            Some(task) => task.await,
            None => Ok(()),
        }
    }

    /// Releases the driver to run for as long as its policy keeps it going.
    pub fn detach(mut self) {
        self.task = None;
    }
}

impl Drop for SharingHandle {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

/// Resets the replay window when the driver winds down, on normal exit,
/// cancellation and panic unwind alike.
struct ResetOnExit<T, K>
where
    T: Send + 'static,
    K: ShareSink<T>,
{
    sink: K,
    _values: PhantomData<fn() -> T>,
}

impl<T, K> Drop for ResetOnExit<T, K>
where
    T: Send + 'static,
    K: ShareSink<T>,
{
    fn drop(&mut self) {
        self.sink.reset_replay();
    }
}

/// Starts sharing `upstream` into `sink` under `policy`.
///
/// One background task consumes the policy's command stream, de-duplicated,
/// with latest-wins semantics: every new command first cancels the handling
/// of the previous one by dropping the in-flight collection. A suspended
/// emit withdraws its value on that drop, so cancellation is clean.
pub fn share<T, U, K, P>(upstream: U, sink: K, policy: P) -> SharingHandle
where
    T: Clone + Send + 'static,
    U: ColdStream<T>,
    K: ShareSink<T>,
    P: StartPolicy + 'static,
{
    SharingHandle::new(tokio::spawn(run_driver(upstream, sink, policy)))
}

async fn run_driver<T, U, K, P>(mut upstream: U, sink: K, policy: P)
where
    T: Clone + Send + 'static,
    U: ColdStream<T>,
    K: ShareSink<T>,
    P: StartPolicy + 'static,
{
    let _reset = ResetOnExit { sink: sink.clone(), _values: PhantomData };
    let mut commands = policy.commands(sink.subscription_count());
    let mut collection: Option<Pin<Box<dyn Future<Output = ()> + Send>>> = None;
    let mut last = None;

    loop {
        tokio::select! {
            command = commands.next() => {
                let Some(command) = command else { break };
                if last == Some(command) {
                    continue;
                }
                last = Some(command);
                debug!(?command, "sharing command");
                // Cancel-latest: dropping the in-flight collection stops the
                // upstream before the new command takes effect.
                collection = None;
                match command {
                    Command::Start => {
                        let values = upstream.open();
                        let sink = sink.clone();
                        collection = Some(Box::pin(async move {
                            tokio::pin!(values);
                            while let Some(value) = values.next().await {
                                sink.accept(value).await;
                            }
                        }));
                    }
                    Command::Stop => {}
                    Command::StopAndReset => sink.reset_replay(),
                }
            }
            () = async {
                match collection.as_mut() {
                    Some(collection) => collection.as_mut().await,
                    None => std::future::pending().await,
                }
            }, if collection.is_some() => {
                debug!("upstream collection finished");
                collection = None;
            }
        }
    }

    // The policy is done issuing commands; let the final collection run to
    // completion before the replay window is reset.
    if let Some(collection) = collection.take() {
        collection.await;
    }
}

// ---------------------------------------------------------------------
// FACTORIES
// ---------------------------------------------------------------------

fn sharing_config<T, U: ColdStream<T>>(upstream: &U, replay: usize) -> SharedConfig {
    match upstream.buffer_hint() {
        Some(hint) => SharedConfig::new(replay)
            .with_extra_buffer(hint.capacity)
            .with_overflow(hint.overflow),
        None => SharedConfig::new(replay)
            .with_extra_buffer(DEFAULT_EXTRA_CAPACITY.max(replay) - replay),
    }
}

/// Shares `upstream` as a hot stream replaying the last `replay` values.
///
/// Buffering beyond the replay window comes from the upstream's
/// [`buffer_hint`](ColdStream::buffer_hint) when present, and otherwise
/// defaults to [`DEFAULT_EXTRA_CAPACITY`] with the suspending overflow
/// policy.
pub fn shared_of<T, U, P>(
    upstream: U,
    replay: usize,
    policy: P,
) -> Result<(SharedStream<T>, SharingHandle), ConfigError>
where
    T: Clone + Send + 'static,
    U: ColdStream<T>,
    P: StartPolicy + 'static,
{
    let shared = MutableSharedStream::new(sharing_config(&upstream, replay))?;
    let stream = shared.read_only();
    let handle = share(upstream, shared, policy);
    Ok((stream, handle))
}

/// Like [`shared_of`], with the replay window seeded (and re-seeded on
/// reset) with `initial`.
pub fn shared_of_with_initial<T, U, P>(
    upstream: U,
    replay: usize,
    policy: P,
    initial: T,
) -> Result<(SharedStream<T>, SharingHandle), ConfigError>
where
    T: Clone + Send + 'static,
    U: ColdStream<T>,
    P: StartPolicy + 'static,
{
    let shared = MutableSharedStream::with_initial(sharing_config(&upstream, replay), initial)?;
    let stream = shared.read_only();
    let handle = share(upstream, shared, policy);
    Ok((stream, handle))
}

/// Shares `upstream` as a state stream rooted at `initial`.
pub fn state_of<T, U, P>(upstream: U, policy: P, initial: T) -> (StateStream<T>, SharingHandle)
where
    T: Clone + PartialEq + Send + 'static,
    U: ColdStream<T>,
    P: StartPolicy + 'static,
{
    let state = MutableStateStream::new(initial);
    let stream = state.read_only();
    let handle = share(upstream, state, policy);
    (stream, handle)
}

/// Opens `upstream` once and suspends until its first value, then returns a
/// state stream rooted at that value while the same collection keeps
/// feeding it.
///
/// Returns `None` when the upstream ends without producing a value.
pub async fn state_awaiting_first<T, U>(mut upstream: U) -> Option<(StateStream<T>, SharingHandle)>
where
    T: Clone + PartialEq + Send + 'static,
    U: ColdStream<T>,
{
    let mut values = Box::pin(upstream.open());
    let first = values.next().await?;

    let state = MutableStateStream::new(first);
    let stream = state.read_only();
    let task = tokio::spawn(async move {
        let _reset = ResetOnExit { sink: state.clone(), _values: PhantomData };
        while let Some(value) = values.next().await {
            state.set_value(value);
        }
    });
    Some((stream, SharingHandle::new(task)))
}
