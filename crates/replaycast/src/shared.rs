//! The shared-stream core.
//!
//! A shared stream is a hot, multicast value stream: every emitted value fans
//! out to all current subscribers, the most recent `replay` values are kept
//! for late subscribers, and up to `extra_buffer` further values absorb the
//! lag of slow subscribers. When the buffer is full the configured overflow
//! policy decides whether the producer suspends or values are dropped.
//!
//! # Synchronization protocol
//!
//! One mutex guards the whole instance state. Every operation follows the
//! same shape:
//!
//! 1. Acquire the lock and run a bounded state transition.
//! 2. Collect the wakers of every party the transition unblocked (waiting
//!    subscribers, suspended producers) into a local list.
//! 3. Release the lock, then invoke the wakers.
//!
//! Wakers are never invoked while the lock is held. Suspension is expressed
//! through ordinary futures: a waiting subscriber parks its waker in its
//! slot, a suspended producer parks an emitter record in the buffer's queue
//! region. Dropping either future cancels cleanly (the slot is freed, the
//! emitter is tombstoned).
//!
//! # Logical index space
//!
//! All positions are monotonically increasing `u64` sequence numbers shared
//! between the buffered region `[head, buffer_end)` and the queued-emitter
//! region `[buffer_end, queue_end)`, with
//! `head = min(min_collector_index, replay_index)`.

use crate::buffer::{EmitterRecord, Entry, EntryBuffer};
use crate::config::{OverflowPolicy, SharedConfig};
use crate::error::ConfigError;
use crate::invariants::{
    debug_assert_cursor_bounds, debug_assert_index_order, debug_assert_min_collector,
    debug_assert_replay_window, debug_assert_storage_shape,
};
use crate::slots::{SlotId, SlotRegistry};
use crate::subscription::Subscription;
use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};
use tokio::sync::watch;

/// Writable handle to a shared stream.
///
/// Cloning is cheap and every clone refers to the same stream. Any clone may
/// emit; readers are attached with [`subscribe`](Self::subscribe), or through
/// the [`SharedStream`] view returned by [`read_only`](Self::read_only).
pub struct MutableSharedStream<T> {
    core: Arc<SharedCore<T>>,
}

impl<T> Clone for MutableSharedStream<T> {
    fn clone(&self) -> Self {
        Self { core: Arc::clone(&self.core) }
    }
}

/// Read-only view of a shared stream.
pub struct SharedStream<T> {
    core: Arc<SharedCore<T>>,
}

impl<T> Clone for SharedStream<T> {
    fn clone(&self) -> Self {
        Self { core: Arc::clone(&self.core) }
    }
}

impl<T: Clone> MutableSharedStream<T> {
    /// Creates a shared stream with the given configuration.
    pub fn new(config: SharedConfig) -> Result<Self, ConfigError> {
        Self::build(config, None)
    }

    /// Creates a shared stream whose replay window starts out holding
    /// `initial`. Requires `config.replay > 0`.
    pub fn with_initial(config: SharedConfig, initial: T) -> Result<Self, ConfigError> {
        Self::build(config, Some(initial))
    }

    fn build(config: SharedConfig, initial: Option<T>) -> Result<Self, ConfigError> {
        config.validate()?;
        if initial.is_some() && config.replay == 0 {
            return Err(ConfigError::InitialWithoutReplay);
        }
        Ok(Self { core: Arc::new(SharedCore::new(config, initial)) })
    }

    /// Constructor for the state-stream configuration, which always
    /// validates: replay 1, no extra buffer, drop-oldest, an initial value.
    pub(crate) fn state_configured(initial: T) -> Self {
        let config = SharedConfig::new(1).with_overflow(OverflowPolicy::DropOldest);
        Self { core: Arc::new(SharedCore::new(config, Some(initial))) }
    }

    /// Emits a value without suspending.
    ///
    /// Returns `Err` with the value handed back when the buffer is full, the
    /// overflow policy is [`OverflowPolicy::Suspend`] and a slow subscriber
    /// is blocking progress; use [`emit`](Self::emit) to wait for space
    /// instead. With any other policy this always succeeds.
    pub fn try_emit(&self, value: T) -> Result<(), T> {
        self.core.try_emit(value)
    }

    /// Emits a value, suspending while the buffer is full under
    /// [`OverflowPolicy::Suspend`].
    ///
    /// Cancellation safe: dropping the returned future before it completes
    /// withdraws the value; it is never delivered partially.
    pub async fn emit(&self, value: T) {
        // A zero-capacity stream always parks the producer so a subscriber
        // can rendezvous with it, even while no subscriber is attached.
        if !self.core.rendezvous {
            match self.core.try_emit(value) {
                Ok(()) => return,
                Err(rejected) => return EmitFuture::new(Arc::clone(&self.core), rejected).await,
            }
        }
        EmitFuture::new(Arc::clone(&self.core), value).await
    }

    /// Clears the replay window for future subscribers.
    ///
    /// When the stream was built [`with_initial`](Self::with_initial), the
    /// window is re-seeded with the initial value instead of left empty.
    /// Idempotent; queued suspended producers are preserved.
    pub fn reset_replay(&self) {
        self.core.reset_replay();
    }

    /// Attaches a new subscriber positioned at the start of the current
    /// replay window.
    pub fn subscribe(&self) -> Subscription<T> {
        Subscription::attach(Arc::clone(&self.core))
    }

    /// Copies the current replay window.
    pub fn replay_snapshot(&self) -> Vec<T> {
        self.core.replay_snapshot()
    }

    /// Observable number of active subscribers.
    ///
    /// The count changes atomically with subscribe/unsubscribe; readers of
    /// the returned channel observe it with the usual watch semantics.
    pub fn subscription_count(&self) -> watch::Receiver<usize> {
        self.core.count.subscribe()
    }

    /// Read-only view of this stream.
    pub fn read_only(&self) -> SharedStream<T> {
        SharedStream { core: Arc::clone(&self.core) }
    }
}

impl<T: Clone + PartialEq> MutableSharedStream<T> {
    /// Emits `value` unless it compares equal to the newest replay entry.
    /// The comparison and the emission happen under one lock acquisition.
    pub(crate) fn emit_distinct(&self, value: T) -> bool {
        self.core.emit_distinct(value)
    }

    /// Newest replay entry, if the window is non-empty.
    pub(crate) fn latest_value(&self) -> Option<T> {
        self.core.latest_value()
    }
}

impl<T: Clone> SharedStream<T> {
    /// Attaches a new subscriber positioned at the start of the current
    /// replay window.
    pub fn subscribe(&self) -> Subscription<T> {
        Subscription::attach(Arc::clone(&self.core))
    }

    /// Copies the current replay window.
    pub fn replay_snapshot(&self) -> Vec<T> {
        self.core.replay_snapshot()
    }

    /// Observable number of active subscribers.
    pub fn subscription_count(&self) -> watch::Receiver<usize> {
        self.core.count.subscribe()
    }

    pub(crate) fn latest(&self) -> Option<T> {
        self.core.latest_value()
    }
}

// ---------------------------------------------------------------------
// CORE
// ---------------------------------------------------------------------

pub(crate) struct SharedCore<T> {
    state: Mutex<State<T>>,
    /// Subscriber count signal; written right after allocate/free.
    count: watch::Sender<usize>,
    /// Zero total capacity: values are handed producer-to-subscriber.
    rendezvous: bool,
}

impl<T: Clone> SharedCore<T> {
    fn new(config: SharedConfig, initial: Option<T>) -> Self {
        let mut state = State {
            entries: EntryBuffer::new(),
            replay_index: 0,
            min_collector_index: 0,
            buffer_size: 0,
            queue_size: 0,
            slots: SlotRegistry::new(),
            next_emitter_id: 0,
            replay: config.replay,
            capacity: config.capacity(),
            overflow: config.overflow,
            initial,
            replay_is_initial: false,
        };
        if let Some(initial) = state.initial.clone() {
            state.enqueue(Entry::Value(initial));
            state.buffer_size = 1;
            // Default position for subscribers that are not attached yet.
            state.min_collector_index = 1;
            state.replay_is_initial = true;
        }
        let (count, _) = watch::channel(0);
        Self { state: Mutex::new(state), count, rendezvous: config.capacity() == 0 }
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        // A panic while holding the lock leaves consistent-enough state for
        // the remaining handles to shut down; keep going.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn try_emit(&self, value: T) -> Result<(), T> {
        let mut wakers = Vec::new();
        let result = {
            let mut state = self.lock();
            match state.try_emit_locked(value) {
                Ok(()) => {
                    state.collect_ready_wakers(&mut wakers);
                    Ok(())
                }
                Err(rejected) => Err(rejected),
            }
        };
        for waker in wakers {
            waker.wake();
        }
        result
    }

    fn emit_distinct(&self, value: T) -> bool
    where
        T: PartialEq,
    {
        let mut wakers = Vec::new();
        let updated = {
            let mut state = self.lock();
            if state.latest_equals(&value) {
                false
            } else {
                match state.try_emit_locked(value) {
                    Ok(()) => state.collect_ready_wakers(&mut wakers),
                    // Unreachable under drop-oldest, the only policy that
                    // pairs with distinct emission.
                    Err(_) => debug_assert!(false, "drop-oldest emission rejected"),
                }
                true
            }
        };
        for waker in wakers {
            waker.wake();
        }
        updated
    }

    fn reset_replay(&self) {
        let mut wakers = Vec::new();
        {
            let mut state = self.lock();
            state.reset_replay_locked(&mut wakers);
        }
        for waker in wakers {
            waker.wake();
        }
    }

    fn replay_snapshot(&self) -> Vec<T> {
        let state = self.lock();
        let mut snapshot = Vec::with_capacity(state.replay_size());
        for index in state.replay_index..state.buffer_end() {
            if let Entry::Value(value) = state.entries.get(index) {
                snapshot.push(value.clone());
            }
        }
        snapshot
    }

    fn latest_value(&self) -> Option<T> {
        let state = self.lock();
        if state.replay_size() == 0 {
            return None;
        }
        match state.entries.get(state.buffer_end() - 1) {
            Entry::Value(value) => Some(value.clone()),
            _ => None,
        }
    }

    // -----------------------------------------------------------------
    // Subscriber side
    // -----------------------------------------------------------------

    /// Registers a new subscriber slot at the current replay position.
    pub(crate) fn allocate_slot(&self) -> SlotId {
        let slot = {
            let mut state = self.lock();
            let cursor = state.replay_index;
            if cursor < state.min_collector_index {
                state.min_collector_index = cursor;
            }
            state.slots.allocate(cursor)
        };
        self.count.send_modify(|count| *count += 1);
        slot
    }

    /// Frees a subscriber slot, resuming producers its lag was blocking.
    pub(crate) fn free_slot(&self, slot: SlotId) {
        let mut wakers = Vec::new();
        {
            let mut state = self.lock();
            let old_cursor = state.slots.free(slot);
            state.update_collector_index(old_cursor, &mut wakers);
        }
        self.count.send_modify(|count| *count -= 1);
        for waker in wakers {
            waker.wake();
        }
    }

    /// Takes the next value for `slot` or parks its waker.
    pub(crate) fn poll_take(&self, slot: SlotId, cx: &mut Context<'_>) -> Poll<T> {
        let mut wakers = Vec::new();
        let result = {
            let mut state = self.lock();
            loop {
                let cursor = state.slots.cursor(slot);
                let Some(index) = state.try_peek(cursor) else {
                    state.slots.set_waker(slot, cx.waker());
                    break Poll::Pending;
                };
                let value = state.peeked_value(index);
                state.slots.set_cursor(slot, index + 1);
                state.update_collector_index(cursor, &mut wakers);
                match value {
                    Some(value) => break Poll::Ready(value),
                    // Stepped over a cancelled hand-off; look again.
                    None => continue,
                }
            }
        };
        for waker in wakers {
            waker.wake();
        }
        result
    }

    // -----------------------------------------------------------------
    // Producer side
    // -----------------------------------------------------------------

    /// Removes a cancelled emitter from the queue region.
    fn cancel_emitter(&self, id: u64) {
        let mut state = self.lock();
        for index in state.buffer_end()..state.queue_end() {
            if state.entries.emitter_id(index) == Some(id) {
                state.entries.set_tombstone(index);
                state.cleanup_tail();
                break;
            }
        }
    }
}

// ---------------------------------------------------------------------
// STATE TRANSITIONS (all under the instance lock)
// ---------------------------------------------------------------------

struct State<T> {
    entries: EntryBuffer<T>,
    /// Smallest logical index a new subscriber sees on attach.
    replay_index: u64,
    /// Smallest cursor among active subscribers; a default position past the
    /// buffered values while none are attached.
    min_collector_index: u64,
    /// Buffered values, both inside and ahead of the replay window.
    buffer_size: usize,
    /// Suspended emitters queued past the buffered values.
    queue_size: usize,
    slots: SlotRegistry,
    next_emitter_id: u64,
    replay: usize,
    capacity: usize,
    overflow: OverflowPolicy,
    initial: Option<T>,
    /// The replay window holds exactly the re-seeded initial value; makes
    /// `reset_replay` idempotent without an equality bound.
    replay_is_initial: bool,
}

impl<T: Clone> State<T> {
    #[inline]
    fn head(&self) -> u64 {
        self.min_collector_index.min(self.replay_index)
    }

    #[inline]
    fn buffer_end(&self) -> u64 {
        self.head() + self.buffer_size as u64
    }

    #[inline]
    fn queue_end(&self) -> u64 {
        self.buffer_end() + self.queue_size as u64
    }

    #[inline]
    fn replay_size(&self) -> usize {
        (self.buffer_end() - self.replay_index) as usize
    }

    #[inline]
    fn total_size(&self) -> usize {
        self.buffer_size + self.queue_size
    }

    /// Non-suspending emission.
    fn try_emit_locked(&mut self, value: T) -> Result<(), T> {
        if self.slots.active_count() == 0 {
            self.emit_no_collectors(value);
            self.assert_invariants();
            return Ok(());
        }
        // Full means the buffer is at capacity and the slowest subscriber
        // still needs the oldest value (otherwise replay can give way).
        if self.buffer_size >= self.capacity && self.min_collector_index <= self.replay_index {
            match self.overflow {
                OverflowPolicy::Suspend => return Err(value),
                OverflowPolicy::DropLatest => return Ok(()),
                OverflowPolicy::DropOldest => {}
            }
        }
        self.enqueue(Entry::Value(value));
        self.buffer_size += 1;
        if self.buffer_size > self.capacity {
            self.drop_oldest();
        }
        if self.replay_size() > self.replay {
            self.update_buffer(
                self.replay_index + 1,
                self.min_collector_index,
                self.buffer_end(),
                self.queue_end(),
            );
        }
        self.assert_invariants();
        Ok(())
    }

    /// With nobody attached only the replay window is maintained.
    fn emit_no_collectors(&mut self, value: T) {
        debug_assert_eq!(self.slots.active_count(), 0);
        if self.replay == 0 {
            return;
        }
        self.enqueue(Entry::Value(value));
        self.buffer_size += 1;
        if self.buffer_size > self.replay {
            self.drop_oldest();
        }
        // Default position for subscribers that are not attached yet.
        self.min_collector_index = self.head() + self.buffer_size as u64;
    }

    /// Parks a suspended producer in the queue region.
    fn enqueue_emitter(&mut self, value: T, waker: Waker) -> u64 {
        let id = self.next_emitter_id;
        self.next_emitter_id += 1;
        self.enqueue(Entry::Emitter(EmitterRecord { id, value, waker: Some(waker) }));
        self.queue_size += 1;
        self.assert_invariants();
        id
    }

    /// Stores `entry` at the end of the live range, growing storage on
    /// demand. The caller accounts for it in `buffer_size` or `queue_size`.
    fn enqueue(&mut self, entry: Entry<T>) {
        let total = self.total_size();
        if total >= self.entries.capacity() {
            self.entries.grow(self.head(), total);
        }
        self.entries.put(self.head() + total as u64, entry);
        self.replay_is_initial = false;
    }

    /// Drops the value at `head`, snapping slow cursors forward.
    fn drop_oldest(&mut self) {
        let head = self.head();
        self.entries.clear_at(head);
        self.buffer_size -= 1;
        let new_head = head + 1;
        if self.replay_index < new_head {
            self.replay_index = new_head;
        }
        if self.min_collector_index < new_head {
            // Slow subscribers have missed this value.
            self.slots.snap_cursors_to(new_head);
            self.min_collector_index = new_head;
        }
        debug_assert_eq!(self.head(), new_head);
    }

    /// Commits new index values and clears cells the head moved past.
    fn update_buffer(
        &mut self,
        new_replay_index: u64,
        new_min_collector_index: u64,
        new_buffer_end: u64,
        new_queue_end: u64,
    ) {
        let old_head = self.head();
        let new_head = new_min_collector_index.min(new_replay_index);
        debug_assert!(new_head >= old_head);
        for index in old_head..new_head {
            self.entries.clear_at(index);
        }
        self.replay_index = new_replay_index;
        self.min_collector_index = new_min_collector_index;
        self.buffer_size = (new_buffer_end - new_head) as usize;
        self.queue_size = (new_queue_end - new_buffer_end) as usize;
    }

    /// Index `slot_cursor` may read from, or `None` to wait.
    fn try_peek(&self, cursor: u64) -> Option<u64> {
        if cursor < self.buffer_end() {
            return Some(cursor);
        }
        if self.capacity > 0 {
            // Buffered streams never read ahead into the emitter queue.
            return None;
        }
        // Rendezvous: read the first queued emitter only, never further.
        if cursor > self.head() || self.queue_size == 0 {
            return None;
        }
        Some(cursor)
    }

    /// Value behind a peeked index. `None` when the cell holds a cancelled
    /// hand-off the caller should step over.
    fn peeked_value(&self, index: u64) -> Option<T> {
        match self.entries.get(index) {
            Entry::Value(value) => Some(value.clone()),
            Entry::Emitter(record) => Some(record.value.clone()),
            Entry::Tombstone => None,
            Entry::Empty => {
                debug_assert!(false, "peeked an empty cell at {index}");
                None
            }
        }
    }

    fn latest_equals(&self, value: &T) -> bool
    where
        T: PartialEq,
    {
        if self.replay_size() == 0 {
            return false;
        }
        matches!(self.entries.get(self.buffer_end() - 1), Entry::Value(current) if current == value)
    }

    /// Recomputes the minimum collector index after a cursor advanced past
    /// `old_cursor` or its slot was freed, resuming as many queued emitters
    /// as the freed space allows. Wakers to invoke after unlocking are
    /// appended to `wakers`.
    fn update_collector_index(&mut self, old_cursor: u64, wakers: &mut Vec<Waker>) {
        debug_assert!(old_cursor >= self.min_collector_index);
        if old_cursor > self.min_collector_index {
            // A slower subscriber still pins the minimum.
            return;
        }
        let head = self.head();
        let buffer_end = self.buffer_end();
        let queue_end = self.queue_end();

        let mut new_min = buffer_end;
        if self.capacity == 0 && self.queue_size > 0 {
            // Keep the first queued emitter reachable for a rendezvous read.
            new_min += 1;
        }
        self.slots.for_each_cursor(|cursor| {
            if cursor < new_min {
                new_min = cursor;
            }
        });
        debug_assert!(new_min >= self.min_collector_index);
        if new_min <= self.min_collector_index {
            return;
        }

        // How many queued emitters fit into the space the move frees up.
        let max_resume = if self.slots.active_count() > 0 {
            let available = if self.capacity == 0 {
                // The bump above reserves exactly one hand-off position.
                new_min.saturating_sub(buffer_end) as usize
            } else {
                self.capacity.saturating_sub((buffer_end - new_min) as usize)
            };
            self.queue_size.min(available)
        } else {
            self.queue_size
        };

        let mut new_buffer_end = buffer_end;
        let mut resumed = 0;
        if max_resume > 0 {
            for index in buffer_end..queue_end {
                if resumed >= max_resume {
                    break;
                }
                // Cancelled emitters stay in place; tail cleanup removes them.
                let Some(record) = self.entries.take_emitter(index) else { continue };
                if let Some(waker) = record.waker {
                    wakers.push(waker);
                }
                self.entries.put(new_buffer_end, Entry::Value(record.value));
                new_buffer_end += 1;
                resumed += 1;
            }
        }

        let new_buffer_size = (new_buffer_end - head) as usize;
        // With nobody attached every emitter was resumed above, possibly past
        // capacity; the default minimum is then the end of the buffer.
        if self.slots.active_count() == 0 {
            new_min = new_buffer_end;
        }
        let mut new_replay_index = self
            .replay_index
            .max(new_buffer_end - self.replay.min(new_buffer_size) as u64);
        // Rendezvous: a cancelled hand-off left at the replay position is
        // absorbed so the indices stay ordered.
        if self.capacity == 0
            && new_replay_index < queue_end
            && self.entries.is_tombstone(new_replay_index)
        {
            new_buffer_end += 1;
            new_replay_index += 1;
        }
        if resumed > 0 {
            self.replay_is_initial = false;
        }
        self.update_buffer(new_replay_index, new_min, new_buffer_end, queue_end);
        self.cleanup_tail();
        if resumed > 0 || self.capacity == 0 {
            // Freshly buffered values may unblock waiting subscribers; in
            // rendezvous mode the head can also move past a cancelled
            // hand-off, which re-arms peeks at the queue front.
            self.collect_ready_wakers(wakers);
        }
        self.assert_invariants();
    }

    /// Strips trailing tombstones from the queue region. A rendezvous stream
    /// keeps its last queued entry so the hand-off position survives.
    fn cleanup_tail(&mut self) {
        if self.capacity == 0 && self.queue_size <= 1 {
            return;
        }
        while self.queue_size > 0 {
            let last = self.head() + self.total_size() as u64 - 1;
            if !self.entries.is_tombstone(last) {
                break;
            }
            self.queue_size -= 1;
            self.entries.clear_at(self.head() + self.total_size() as u64);
        }
    }

    /// Re-arms the waker of the queued emitter `id`; `false` when the record
    /// is gone because the value was accepted.
    fn refresh_emitter_waker(&mut self, id: u64, waker: &Waker) -> bool {
        for index in self.buffer_end()..self.queue_end() {
            if self.entries.emitter_id(index) == Some(id) {
                self.entries.set_emitter_waker(index, waker);
                return true;
            }
        }
        false
    }

    /// Erases the replay window; with a configured initial value the window
    /// is re-seeded so it holds exactly that value.
    fn reset_replay_locked(&mut self, wakers: &mut Vec<Waker>) {
        match self.initial.clone() {
            None => {
                if self.replay_size() == 0 {
                    return;
                }
                self.update_buffer(
                    self.buffer_end(),
                    self.min_collector_index,
                    self.buffer_end(),
                    self.queue_end(),
                );
            }
            Some(initial) => {
                if self.replay_is_initial {
                    return;
                }
                self.update_buffer(
                    self.buffer_end(),
                    self.min_collector_index,
                    self.buffer_end(),
                    self.queue_end(),
                );
                // The initial value slots in between the buffered values and
                // the queued emitters, which shift one position right.
                self.insert_before_queue(Entry::Value(initial));
                self.buffer_size += 1;
                if self.buffer_size > self.capacity {
                    // The window must end up holding the initial value, so
                    // the oldest buffered value gives way whatever the
                    // configured policy is.
                    self.drop_oldest();
                }
                self.replay_index = self.buffer_end() - 1;
                self.replay_is_initial = true;
                self.collect_ready_wakers(wakers);
            }
        }
        self.assert_invariants();
    }

    /// Inserts an entry at `buffer_end`, shifting the queue region right.
    fn insert_before_queue(&mut self, entry: Entry<T>) {
        let total = self.total_size();
        if total >= self.entries.capacity() {
            self.entries.grow(self.head(), total);
        }
        let buffer_end = self.buffer_end();
        let mut index = self.head() + total as u64;
        while index > buffer_end {
            let moved = self.entries.take(index - 1);
            self.entries.put(index, moved);
            index -= 1;
        }
        self.entries.put(buffer_end, entry);
    }

    /// Hands out the wakers of every waiting subscriber that can now peek a
    /// value.
    fn collect_ready_wakers(&mut self, wakers: &mut Vec<Waker>) {
        let head = self.head();
        let buffer_end = self.buffer_end();
        let queue_size = self.queue_size;
        let capacity = self.capacity;
        self.slots.take_ready_wakers(wakers, |cursor| {
            cursor < buffer_end || (capacity == 0 && cursor <= head && queue_size > 0)
        });
    }

    fn assert_invariants(&self) {
        if !cfg!(debug_assertions) {
            return;
        }
        debug_assert_replay_window!(self.replay_size(), self.replay);
        debug_assert_index_order!(
            self.head(),
            self.replay_index,
            self.buffer_end(),
            self.min_collector_index
        );
        self.slots
            .for_each_cursor(|cursor| debug_assert_cursor_bounds!(cursor, self.head(), self.buffer_end()));
        debug_assert_storage_shape!(self.entries.capacity(), self.total_size());
        debug_assert_min_collector!(self.min_collector_index, self.slots.min_cursor());
    }
}

// ---------------------------------------------------------------------
// SUSPENDED EMISSION
// ---------------------------------------------------------------------

enum EmitStage<T> {
    /// Not yet in the buffer; holds the value to deliver.
    Enqueue(T),
    /// Parked in the queue region under this emitter id.
    Waiting(u64),
    Done,
}

/// Future behind [`MutableSharedStream::emit`] once the fast path failed.
struct EmitFuture<T: Clone> {
    core: Arc<SharedCore<T>>,
    stage: EmitStage<T>,
}

impl<T: Clone> EmitFuture<T> {
    fn new(core: Arc<SharedCore<T>>, value: T) -> Self {
        Self { core, stage: EmitStage::Enqueue(value) }
    }
}

// The future holds no self-references; the pending value moves freely.
impl<T: Clone> Unpin for EmitFuture<T> {}

impl<T: Clone> Future for EmitFuture<T> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        let mut wakers = Vec::new();
        let poll = {
            let mut state = this.core.lock();
            match mem::replace(&mut this.stage, EmitStage::Done) {
                EmitStage::Enqueue(value) => {
                    // Recheck under the lock; space may have freed up since
                    // the fast path failed. Rendezvous streams enqueue
                    // unconditionally.
                    let value = if state.capacity > 0 {
                        match state.try_emit_locked(value) {
                            Ok(()) => {
                                state.collect_ready_wakers(&mut wakers);
                                None
                            }
                            Err(rejected) => Some(rejected),
                        }
                    } else {
                        Some(value)
                    };
                    match value {
                        None => Poll::Ready(()),
                        Some(value) => {
                            let id = state.enqueue_emitter(value, cx.waker().clone());
                            if state.capacity == 0 {
                                // Let a subscriber waiting at head observe
                                // the new hand-off.
                                state.collect_ready_wakers(&mut wakers);
                            }
                            this.stage = EmitStage::Waiting(id);
                            Poll::Pending
                        }
                    }
                }
                EmitStage::Waiting(id) => {
                    if state.refresh_emitter_waker(id, cx.waker()) {
                        this.stage = EmitStage::Waiting(id);
                        Poll::Pending
                    } else {
                        // The record is gone: the value entered the buffer.
                        Poll::Ready(())
                    }
                }
                EmitStage::Done => Poll::Ready(()),
            }
        };
        for waker in wakers {
            waker.wake();
        }
        poll
    }
}

impl<T: Clone> Drop for EmitFuture<T> {
    fn drop(&mut self) {
        if let EmitStage::Waiting(id) = self.stage {
            self.core.cancel_emitter(id);
        }
    }
}
