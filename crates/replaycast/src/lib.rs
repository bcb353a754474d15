//! Hot multicast value streams with replay, buffering and suspension.
//!
//! A [`MutableSharedStream`] fans every emitted value out to all of its
//! subscribers. The most recent `replay` values are retained and replayed to
//! late subscribers; `extra_buffer` further slots absorb the lag of slow
//! subscribers; and when the buffer fills up an [`OverflowPolicy`] decides
//! whether the producer suspends or values are dropped. A zero-capacity
//! stream degenerates to a rendezvous: each value is handed directly from a
//! suspended producer to a subscriber.
//!
//! # Features
//!
//! - **Multicast with replay**: every subscriber sees the replay window and
//!   then each accepted value, in order and without gaps
//! - **Backpressure**: `emit` suspends while a slow subscriber blocks a full
//!   buffer; `try_emit` hands the value back instead
//! - **Cancellation safe**: dropping a suspended emit withdraws its value,
//!   dropping a subscription frees its slot and unblocks producers
//! - **Observable subscribers**: the subscription count is a watch channel,
//!   usable to start and stop an upstream on demand
//! - **State streams**: single-value variant with equality-gated writes
//!
//! # Example
//!
//! ```ignore
//! use replaycast::{MutableSharedStream, SharedConfig, StreamExt};
//!
//! #[tokio::main]
//! async fn main() {
//!     let stream = MutableSharedStream::new(SharedConfig::new(2)).unwrap();
//!
//!     stream.try_emit("early").unwrap();
//!
//!     // A late subscriber still observes the replay window.
//!     let mut sub = stream.subscribe();
//!     assert_eq!(sub.next().await, Some("early"));
//!
//!     stream.emit("live").await;
//!     assert_eq!(sub.next().await, Some("live"));
//! }
//! ```
//!
//! The shared stream never completes and never fails. Upstream lifecycles,
//! start policies and drivers live in the companion `replaycast-share`
//! crate.

mod buffer;
mod config;
mod error;
mod invariants;
mod shared;
mod slots;
mod state;
mod subscription;

pub use config::{OverflowPolicy, SharedConfig};
pub use error::ConfigError;
pub use shared::{MutableSharedStream, SharedStream};
pub use state::{MutableStateStream, StateStream};
pub use subscription::{Subscription, SubscriptionSink};

// Re-export useful stream combinators
pub use tokio_stream::StreamExt;
