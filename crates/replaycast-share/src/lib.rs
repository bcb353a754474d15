//! Sharing drivers and start policies for replaycast streams.
//!
//! This crate turns a cold, restartable producer into a hot
//! [`replaycast::SharedStream`]: a single background task collects the
//! upstream and emits into the shared stream, started and stopped by a
//! [`StartPolicy`] that watches the subscriber count.
//!
//! # Features
//!
//! - **Start policies**: [`Eager`], [`Lazy`] and [`WhileSubscribed`]
//!   built-ins, or any custom [`StartPolicy`]
//! - **Cancel-latest driving**: every policy command cancels the previous
//!   one before it runs; stopping drops the in-flight collection cleanly
//! - **Buffer fusion**: a [`buffered`] upstream carries its capacity and
//!   overflow policy into the shared stream
//! - **State streams**: [`state_of`] and [`state_awaiting_first`] for the
//!   single-value, distinct-by-equality variant
//!
//! # Example
//!
//! ```ignore
//! use replaycast::StreamExt;
//! use replaycast_share::{shared_of, WhileSubscribed};
//!
//! #[tokio::main]
//! async fn main() {
//!     let upstream = || futures_util::stream::iter(["a", "b", "c"]);
//!     let (stream, driver) =
//!         shared_of(upstream, 1, WhileSubscribed::default()).unwrap();
//!
//!     let mut sub = stream.subscribe();
//!     assert_eq!(sub.next().await, Some("a"));
//!
//!     driver.shutdown();
//! }
//! ```
//!
//! Upstream failures (panics) terminate only the driver task and surface
//! through [`SharingHandle::join`]; subscribers keep waiting, and the replay
//! window is reset whenever the driver winds down.

mod driver;
mod policy;
mod upstream;

pub use driver::{
    share, shared_of, shared_of_with_initial, state_awaiting_first, state_of, ShareSink,
    SharingHandle, DEFAULT_EXTRA_CAPACITY,
};
pub use policy::{Command, CommandStream, Eager, Lazy, StartPolicy, WhileSubscribed};
pub use upstream::{buffered, BufferHint, Buffered, ColdStream};
