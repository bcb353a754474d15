//! Start policies: subscriber counts translated into sharing commands.

use futures_core::Stream;
use futures_util::stream;
use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep, Sleep};
use tokio_stream::wrappers::WatchStream;

/// Instruction from a start policy to the sharing driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Start (or restart) collecting the upstream.
    Start,
    /// Stop collecting; the replay window stays intact.
    Stop,
    /// Stop collecting and erase the replay window.
    StopAndReset,
}

/// Lazy sequence of commands produced by a start policy.
pub type CommandStream = Pin<Box<dyn Stream<Item = Command> + Send>>;

/// Strategy deciding when the sharing driver runs its upstream.
///
/// A policy observes the subscriber count and produces commands. The driver
/// interprets them with latest-wins semantics: each command cancels the
/// handling of the previous one. A policy whose command stream ends leaves
/// the final collection running to completion.
pub trait StartPolicy: Send + Sync {
    fn commands(&self, subscriptions: watch::Receiver<usize>) -> CommandStream;
}

/// Starts the upstream immediately and never stops it.
#[derive(Debug, Clone, Copy, Default)]
pub struct Eager;

impl StartPolicy for Eager {
    fn commands(&self, _subscriptions: watch::Receiver<usize>) -> CommandStream {
        Box::pin(stream::iter([Command::Start]))
    }
}

/// Starts the upstream once the first subscriber appears, then never stops.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lazy;

impl StartPolicy for Lazy {
    fn commands(&self, subscriptions: watch::Receiver<usize>) -> CommandStream {
        Box::pin(stream::once(async move {
            wait_for_subscribers(subscriptions).await;
            Command::Start
        }))
    }
}

async fn wait_for_subscribers(mut subscriptions: watch::Receiver<usize>) {
    loop {
        if *subscriptions.borrow_and_update() > 0 {
            return;
        }
        if subscriptions.changed().await.is_err() {
            // The count signal is gone; no subscriber will ever appear.
            std::future::pending::<()>().await;
        }
    }
}

/// Runs the upstream while subscribers are present.
///
/// Every observed change of the count restarts the policy's reaction, so
/// only the latest state matters: a positive count starts the upstream; a
/// zero count waits `stop_delay`, emits [`Command::Stop`], and after a
/// further `replay_expiration` erases the replay window. A zero
/// `replay_expiration` folds both into an immediate
/// [`Command::StopAndReset`].
///
/// The default stops without delay and never expires the replay window.
#[derive(Debug, Clone, Copy)]
pub struct WhileSubscribed {
    stop_delay: Duration,
    replay_expiration: Duration,
}

impl WhileSubscribed {
    pub fn new(stop_delay: Duration, replay_expiration: Duration) -> Self {
        Self { stop_delay, replay_expiration }
    }

    /// Sets how long the last unsubscribe must stand before collection stops.
    pub fn with_stop_delay(mut self, stop_delay: Duration) -> Self {
        self.stop_delay = stop_delay;
        self
    }

    /// Sets how long the replay window survives a stop.
    pub fn with_replay_expiration(mut self, replay_expiration: Duration) -> Self {
        self.replay_expiration = replay_expiration;
        self
    }
}

impl Default for WhileSubscribed {
    fn default() -> Self {
        Self { stop_delay: Duration::ZERO, replay_expiration: Duration::MAX }
    }
}

impl StartPolicy for WhileSubscribed {
    fn commands(&self, subscriptions: watch::Receiver<usize>) -> CommandStream {
        Box::pin(WhileSubscribedCommands {
            counts: WatchStream::new(subscriptions),
            stop_delay: self.stop_delay,
            replay_expiration: self.replay_expiration,
            timer: None,
            after_timer: None,
            started: false,
            last: None,
        })
    }
}

pin_project! {
    /// Hand-written command stream behind [`WhileSubscribed`].
    ///
    /// The count signal always wins over a running timer: each observation
    /// cancels the timer and restarts the branch for the new count. The
    /// output is gated so that nothing precedes the first `Start` and
    /// consecutive duplicates collapse.
    struct WhileSubscribedCommands {
        #[pin]
        counts: WatchStream<usize>,
        stop_delay: Duration,
        replay_expiration: Duration,
        #[pin]
        timer: Option<Sleep>,
        // Command due when the timer fires.
        after_timer: Option<Command>,
        started: bool,
        last: Option<Command>,
    }
}

/// Applies the start-prefix and dedup gates to a candidate command.
fn gate(started: &mut bool, last: &mut Option<Command>, command: Command) -> Option<Command> {
    if !*started {
        if command != Command::Start {
            return None;
        }
        *started = true;
    }
    if *last == Some(command) {
        return None;
    }
    *last = Some(command);
    Some(command)
}

impl Stream for WhileSubscribedCommands {
    type Item = Command;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Command>> {
        let mut this = self.project();
        loop {
            // Drain the count signal first; the newest observation wins.
            let mut latest = None;
            loop {
                match this.counts.as_mut().poll_next(cx) {
                    Poll::Ready(Some(count)) => latest = Some(count),
                    Poll::Ready(None) => return Poll::Ready(None),
                    Poll::Pending => break,
                }
            }

            if let Some(count) = latest {
                if count > 0 {
                    this.timer.set(None);
                    *this.after_timer = None;
                    if let Some(command) = gate(this.started, this.last, Command::Start) {
                        return Poll::Ready(Some(command));
                    }
                    continue;
                }
                this.timer.set(Some(sleep(*this.stop_delay)));
                *this.after_timer = Some(if this.replay_expiration.is_zero() {
                    Command::StopAndReset
                } else {
                    Command::Stop
                });
                continue;
            }

            let Some(timer) = this.timer.as_mut().as_pin_mut() else {
                return Poll::Pending;
            };
            match timer.poll(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(()) => {
                    this.timer.set(None);
                    match this.after_timer.take() {
                        Some(Command::Stop) => {
                            // The replay window expires after the stop.
                            this.timer.set(Some(sleep(*this.replay_expiration)));
                            *this.after_timer = Some(Command::StopAndReset);
                            if let Some(command) = gate(this.started, this.last, Command::Stop) {
                                return Poll::Ready(Some(command));
                            }
                        }
                        Some(command) => {
                            if let Some(command) = gate(this.started, this.last, command) {
                                return Poll::Ready(Some(command));
                            }
                        }
                        None => {}
                    }
                }
            }
        }
    }
}
