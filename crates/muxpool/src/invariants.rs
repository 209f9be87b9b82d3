//! Debug assertion macros for the fabric invariants.
//!
//! Runtime checks for the structural invariants of the ordered ring, the
//! muxing queue and the wrapper pool. Only active in debug builds
//! (`#[cfg(debug_assertions)]`), so there is zero overhead in release
//! builds.

// =============================================================================
// INV-RING-01: Bounded Occupancy
// =============================================================================

/// Assert that ring occupancy never exceeds capacity.
///
/// **Invariant**: `0 ≤ len ≤ capacity`
macro_rules! debug_assert_ring_bounded {
    ($len:expr, $capacity:expr) => {
        debug_assert!(
            $len <= $capacity,
            "INV-RING-01 violated: occupancy {} exceeds capacity {}",
            $len,
            $capacity
        )
    };
}

// =============================================================================
// INV-RING-02: Rank Order
// =============================================================================

/// Assert that occupied slots form a non-decreasing rank sequence.
///
/// **Invariant**: walking head→tail, ranks never decrease.
///
/// Used in: `OrderedRing::ranked_insert` after the splice.
macro_rules! debug_assert_rank_order {
    ($ring:expr) => {
        debug_assert!(
            $ring.is_rank_ordered(),
            "INV-RING-02 violated: occupied slots out of rank order"
        )
    };
}

// =============================================================================
// INV-MUX-01: Dispatch Settled
// =============================================================================

/// Assert that after `assign` at least one of the two rings is empty.
///
/// **Invariant**: `objects.is_empty() ∨ workers.is_empty()`
///
/// Used in: `MuxingQueue::assign` after the pairing loop.
macro_rules! debug_assert_dispatch_settled {
    ($objects_empty:expr, $workers_empty:expr) => {
        debug_assert!(
            $objects_empty || $workers_empty,
            "INV-MUX-01 violated: pending objects and idle workers coexist after assign"
        )
    };
}

// =============================================================================
// INV-POOL-01: Live Count Sanity
// =============================================================================

/// Assert that a live count stays below the released sentinel.
///
/// **Invariant**: `live_count < RELEASED_SENTINEL` for any held wrapper.
///
/// Used in: `inc_live` before adding references.
macro_rules! debug_assert_live_count {
    ($live:expr) => {
        debug_assert!(
            $live < crate::RELEASED_SENTINEL,
            "INV-POOL-01 violated: live count operation on a released wrapper"
        )
    };
}

// =============================================================================
// Re-exports for crate-internal use
// =============================================================================

pub(crate) use debug_assert_dispatch_settled;
pub(crate) use debug_assert_live_count;
pub(crate) use debug_assert_rank_order;
pub(crate) use debug_assert_ring_bounded;
