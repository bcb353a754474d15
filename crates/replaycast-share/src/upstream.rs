//! The cold upstream seam.
//!
//! A cold producer is restartable: the driver opens it anew on every start
//! command. Any `FnMut` closure returning a stream qualifies.

use futures_core::Stream;
use replaycast::OverflowPolicy;

/// A restartable source of values for a sharing driver.
pub trait ColdStream<T>: Send + 'static {
    type Stream: Stream<Item = T> + Send + 'static;

    /// Opens a fresh collection of the source.
    fn open(&mut self) -> Self::Stream;

    /// Buffering the source carries with it, consumed by `shared_of` in
    /// place of the default capacity.
    fn buffer_hint(&self) -> Option<BufferHint> {
        None
    }
}

/// Capacity carried by a buffered upstream.
#[derive(Debug, Clone, Copy)]
pub struct BufferHint {
    /// Extra buffer capacity to allocate in the shared stream.
    pub capacity: usize,
    /// Overflow behavior at that capacity.
    pub overflow: OverflowPolicy,
}

impl<T, S, F> ColdStream<T> for F
where
    F: FnMut() -> S + Send + 'static,
    S: Stream<Item = T> + Send + 'static,
{
    type Stream = S;

    fn open(&mut self) -> S {
        (self)()
    }
}

/// An upstream annotated with its own buffering, fused into the shared
/// stream instead of the default capacity.
#[derive(Debug)]
pub struct Buffered<U> {
    inner: U,
    hint: BufferHint,
}

/// Annotates `upstream` with a buffer capacity and overflow policy.
pub fn buffered<U>(upstream: U, capacity: usize, overflow: OverflowPolicy) -> Buffered<U> {
    Buffered { inner: upstream, hint: BufferHint { capacity, overflow } }
}

impl<T, U> ColdStream<T> for Buffered<U>
where
    U: ColdStream<T>,
{
    type Stream = U::Stream;

    fn open(&mut self) -> Self::Stream {
        self.inner.open()
    }

    fn buffer_hint(&self) -> Option<BufferHint> {
        Some(self.hint)
    }
}
