//! Debug assertion macros for the shared-stream state machine.
//!
//! Each macro checks one invariant that must hold whenever the stream lock is
//! released. They are only active in debug builds, so there is zero overhead
//! in release builds.

// =============================================================================
// INV-WIN-01: Replay Window Bounds
// =============================================================================

/// Assert that the replay window never exceeds the configured capacity.
///
/// **Invariant**: `0 ≤ replay_size ≤ replay`
///
/// Used in: `State::assert_invariants()` at lock exit
macro_rules! debug_assert_replay_window {
    ($replay_size:expr, $replay:expr) => {
        debug_assert!(
            $replay_size <= $replay,
            "INV-WIN-01 violated: replay window {} exceeds capacity {}",
            $replay_size,
            $replay
        )
    };
}

// =============================================================================
// INV-IDX-02: Index Ordering
// =============================================================================

/// Assert the ordering of the stream's logical indices.
///
/// **Invariant**: `head ≤ replay_index ≤ buffer_end` and
/// `min_collector_index ≤ buffer_end`
///
/// Used in: `State::assert_invariants()` at lock exit
macro_rules! debug_assert_index_order {
    ($head:expr, $replay_index:expr, $buffer_end:expr, $min_collector:expr) => {
        debug_assert!(
            $head <= $replay_index && $replay_index <= $buffer_end,
            "INV-IDX-02 violated: head {} / replay_index {} / buffer_end {} out of order",
            $head,
            $replay_index,
            $buffer_end
        );
        debug_assert!(
            $min_collector <= $buffer_end,
            "INV-IDX-02 violated: min_collector_index {} past buffer_end {}",
            $min_collector,
            $buffer_end
        )
    };
}

// =============================================================================
// INV-CUR-03: Cursor Bounds
// =============================================================================

/// Assert that a subscriber cursor stays inside the buffered window.
///
/// **Invariant**: `head ≤ cursor ≤ buffer_end` for every active slot
///
/// Used in: `State::assert_invariants()` at lock exit
macro_rules! debug_assert_cursor_bounds {
    ($cursor:expr, $head:expr, $buffer_end:expr) => {
        debug_assert!(
            $cursor >= $head && $cursor <= $buffer_end,
            "INV-CUR-03 violated: cursor {} outside [{}, {}]",
            $cursor,
            $head,
            $buffer_end
        )
    };
}

// =============================================================================
// INV-CAP-04: Storage Shape
// =============================================================================

/// Assert that storage is power-of-two sized and holds the live range.
///
/// **Invariant**: `capacity == 0 && total_size == 0`, or
/// `capacity.is_power_of_two() && total_size ≤ capacity`
///
/// Used in: `State::assert_invariants()` at lock exit
macro_rules! debug_assert_storage_shape {
    ($capacity:expr, $total_size:expr) => {
        debug_assert!(
            if $capacity == 0 {
                $total_size == 0
            } else {
                usize::is_power_of_two($capacity) && $total_size <= $capacity
            },
            "INV-CAP-04 violated: {} entries in a {}-cell buffer",
            $total_size,
            $capacity
        )
    };
}

// =============================================================================
// INV-MIN-05: Minimum Collector Index
// =============================================================================

/// Assert that `min_collector_index` tracks the slowest active subscriber.
///
/// **Invariant**: with active slots, `min_collector_index == min(cursors)`
///
/// Used in: `State::assert_invariants()` at lock exit
macro_rules! debug_assert_min_collector {
    ($min_collector:expr, $min_cursor:expr) => {
        debug_assert!(
            match $min_cursor {
                Some(min_cursor) => $min_collector == min_cursor,
                None => true,
            },
            "INV-MIN-05 violated: min_collector_index {} does not track the slowest cursor",
            $min_collector
        )
    };
}

// =============================================================================
// Re-exports for crate-internal use
// =============================================================================

pub(crate) use debug_assert_cursor_bounds;
pub(crate) use debug_assert_index_order;
pub(crate) use debug_assert_min_collector;
pub(crate) use debug_assert_replay_window;
pub(crate) use debug_assert_storage_shape;
