use crate::config::ResourceConfig;
use crate::fifo::WaitStatsSnapshot;
use crate::invariants::debug_assert_live_count;
use crate::queue::MuxingQueue;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Index of a wrapper slot inside its owning resource pool.
pub type WrapperId = usize;

/// Live-count value marking a wrapper that has been returned to the empty
/// pool. Guards against double release: any live-count operation on a
/// wrapper carrying this value is a programmer error.
pub const RELEASED_SENTINEL: u64 = u64::MAX;

/// Error types for resource operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ResourceError {
    /// Too many producer ports registered (exceeds `max_producers`).
    #[error("too many producers registered (max: {max})")]
    TooManyProducers {
        /// The configured maximum number of producers.
        max: usize,
    },
    /// Too many consumer ports registered (exceeds `max_consumers`).
    #[error("too many consumers registered (max: {max})")]
    TooManyConsumers {
        /// The configured maximum number of consumers.
        max: usize,
    },
    /// The resource has been shut down.
    #[error("resource is shut down")]
    Closed,
    /// The resource was built without a full queue (pure allocator).
    #[error("resource has no full queue")]
    NoFullQueue,
    /// The pool could not be constructed as configured.
    #[error("insufficient resources")]
    InsufficientResources,
}

#[derive(Debug, Clone, Copy)]
struct WrapperMeta {
    live_count: u64,
    release_enable: bool,
}

// =============================================================================
// OWNERSHIP PROTOCOL
// =============================================================================
//
// The pool owns every payload for its whole lifetime; what travels through
// the queues is the slot index. Access is governed by a single rule:
//
//   A slot index is, at any instant, in exactly one place — the empty
//   object ring, the full object ring, one worker FIFO, or one
//   `WrapperToken`.
//
// Tokens are only materialized by the two pop paths and only destroyed by
// `post_full` / `release` / `into_shared`, all of which consume the token,
// so the compiler enforces the "held by exactly one worker" leg and the
// rings enforce the rest. Payload references handed out by a token are tied
// to a borrow of that token, which rules out aliased `&mut T`.
//
// The semaphore post/wait pair on each FIFO provides the happens-before
// edge between the thread that last wrote a payload and the thread that
// next reads it.
//
// `ObjectRef` clones deliberately carry no payload access: shared state
// must travel as `Arc` inside `T`, so a stale lifecycle handle can never
// alias a recycled slot.
//
// =============================================================================

#[derive(Debug)]
struct Inner<T> {
    payloads: Box<[UnsafeCell<T>]>,
    /// Per-slot live counts and release fences, all under one lock — the
    /// structural equivalent of the empty queue's lockout mutex in the
    /// reference-count role.
    meta: Mutex<Box<[WrapperMeta]>>,
    empty: MuxingQueue,
    full: Option<MuxingQueue>,
    producer_count: AtomicUsize,
    consumer_count: AtomicUsize,
    closed: AtomicBool,
    config: ResourceConfig,
}

// Safety: payload slots are only reached through a `WrapperToken`, and the
// protocol above guarantees one token per slot; everything else is behind
// mutexes or atomics. `T: Send` is required because payloads migrate
// between worker threads with their tokens.
unsafe impl<T: Send> Send for Inner<T> {}
unsafe impl<T: Send> Sync for Inner<T> {}

/// A bounded pool of reusable wrappers with an empty-side and (optionally)
/// a full-side muxing queue.
///
/// Producers fetch recycled wrappers from the empty side, fill them, and
/// post them full; consumers block for full wrappers and release them back
/// once done. Pool occupancy bounds every ring, so the steady state never
/// allocates and never overflows.
#[derive(Debug)]
pub struct SystemResource<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for SystemResource<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send> SystemResource<T> {
    /// Builds the pool, constructing every payload up front with `init`.
    ///
    /// All wrappers start out queued on the empty side.
    pub fn new(config: ResourceConfig, mut init: impl FnMut() -> T) -> Result<Self, ResourceError> {
        if config.object_count == 0 || config.max_producers == 0 {
            return Err(ResourceError::InsufficientResources);
        }
        if config.full_queue && config.max_consumers == 0 {
            return Err(ResourceError::InsufficientResources);
        }

        let payloads = (0..config.object_count)
            .map(|_| UnsafeCell::new(init()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        let meta = (0..config.object_count)
            .map(|_| WrapperMeta {
                live_count: 0,
                release_enable: true,
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();

        let empty = MuxingQueue::new(config.object_count, config.max_producers, config.enable_metrics);
        // Seed the empty side with the whole pool; no worker is registered
        // yet so nothing dispatches.
        for id in 0..config.object_count {
            empty.push_object(id, 0);
        }

        let full = config
            .full_queue
            .then(|| MuxingQueue::new(config.object_count, config.max_consumers, config.enable_metrics));

        Ok(Self {
            inner: Arc::new(Inner {
                payloads,
                meta: Mutex::new(meta),
                empty,
                full,
                producer_count: AtomicUsize::new(0),
                consumer_count: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
                config,
            }),
        })
    }

    /// Registers a producer port bound to a dedicated empty-side FIFO.
    pub fn register_producer(&self) -> Result<ProducerPort<T>, ResourceError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(ResourceError::Closed);
        }

        let id = self.inner.producer_count.fetch_add(1, Ordering::SeqCst);
        if id >= self.inner.config.max_producers {
            self.inner.producer_count.fetch_sub(1, Ordering::SeqCst);
            return Err(ResourceError::TooManyProducers {
                max: self.inner.config.max_producers,
            });
        }

        Ok(ProducerPort {
            inner: Arc::clone(&self.inner),
            fifo: id,
        })
    }

    /// Registers a consumer port bound to a dedicated full-side FIFO.
    pub fn register_consumer(&self) -> Result<ConsumerPort<T>, ResourceError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(ResourceError::Closed);
        }
        if self.inner.full.is_none() {
            return Err(ResourceError::NoFullQueue);
        }

        let id = self.inner.consumer_count.fetch_add(1, Ordering::SeqCst);
        if id >= self.inner.config.max_consumers {
            self.inner.consumer_count.fetch_sub(1, Ordering::SeqCst);
            return Err(ResourceError::TooManyConsumers {
                max: self.inner.config.max_consumers,
            });
        }

        Ok(ConsumerPort {
            inner: Arc::clone(&self.inner),
            fifo: id,
        })
    }

    /// Cooperative teardown: wakes every blocked worker.
    ///
    /// Queued work already dispatched to a FIFO is still handed out; after
    /// that, every `get_*` call reports [`ResourceError::Closed`].
    pub fn shutdown(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.empty.close();
        if let Some(full) = &self.inner.full {
            full.close();
        }
    }

    /// Number of wrappers owned by the pool.
    pub fn object_count(&self) -> usize {
        self.inner.config.object_count
    }

    /// Current live count of a slot (diagnostics; racy by nature).
    pub fn live_count(&self, id: WrapperId) -> u64 {
        self.inner.meta.lock().expect("pool mutex poisoned")[id].live_count
    }

    /// Current release fence of a slot (diagnostics; racy by nature).
    pub fn release_enabled(&self, id: WrapperId) -> bool {
        self.inner.meta.lock().expect("pool mutex poisoned")[id].release_enable
    }

    /// Wait diagnostics for one consumer FIFO, if metrics are enabled.
    pub fn consumer_wait_stats(&self, consumer: usize) -> Option<WaitStatsSnapshot> {
        self.inner.full.as_ref()?.wait_stats(consumer)
    }
}

/// Producer-side port: fetches recycled wrappers from the empty queue.
///
/// Each port owns one worker FIFO; use one port per worker thread.
#[derive(Debug)]
pub struct ProducerPort<T> {
    inner: Arc<Inner<T>>,
    fifo: usize,
}

impl<T: Send> ProducerPort<T> {
    /// Blocks until an empty wrapper is available.
    ///
    /// The returned token has live count 0, release enabled and rank 0.
    /// Fails only once the resource is shut down.
    pub fn get_empty(&self) -> Result<WrapperToken<T>, ResourceError> {
        let queue = &self.inner.empty;
        queue.enqueue_idle_worker(self.fifo);

        let id = queue
            .fifo(self.fifo)
            .pop_blocking()
            .ok_or(ResourceError::Closed)?;

        {
            let mut meta = self.inner.meta.lock().expect("pool mutex poisoned");
            meta[id].live_count = 0;
            meta[id].release_enable = true;
        }

        Ok(WrapperToken {
            id,
            rank: 0,
            inner: Arc::clone(&self.inner),
        })
    }

    /// This port's worker index on the empty side.
    pub fn id(&self) -> usize {
        self.fifo
    }
}

/// Consumer-side port: blocks for wrappers posted full.
///
/// Each port owns one worker FIFO; use one port per worker thread.
#[derive(Debug)]
pub struct ConsumerPort<T> {
    inner: Arc<Inner<T>>,
    fifo: usize,
}

impl<T: Send> ConsumerPort<T> {
    fn full_queue(&self) -> &MuxingQueue {
        // A consumer port only exists for resources built with a full side.
        self.inner
            .full
            .as_ref()
            .expect("consumer port on a resource without a full queue")
    }

    /// Blocks until a full wrapper is available.
    ///
    /// Fails only once the resource is shut down.
    pub fn get_full(&self) -> Result<WrapperToken<T>, ResourceError> {
        let queue = self.full_queue();
        queue.enqueue_idle_worker(self.fifo);

        let id = queue
            .fifo(self.fifo)
            .pop_blocking()
            .ok_or(ResourceError::Closed)?;

        Ok(WrapperToken {
            id,
            rank: 0,
            inner: Arc::clone(&self.inner),
        })
    }

    /// Non-blocking variant of [`get_full`](Self::get_full).
    ///
    /// Announces this worker as idle either way; on a miss the idle slot
    /// stays eligible, so the next posted wrapper is routed here and the
    /// following call returns it without blocking.
    pub fn try_get_full(&self) -> Result<Option<WrapperToken<T>>, ResourceError> {
        let queue = self.full_queue();
        queue.enqueue_idle_worker(self.fifo);

        if queue.fifo(self.fifo).is_empty() {
            return Ok(None);
        }
        self.get_full().map(Some)
    }

    /// This port's worker index on the full side.
    pub fn id(&self) -> usize {
        self.fifo
    }
}

/// Unique handle to one pooled wrapper and its payload.
///
/// Obtained from the pop paths; consumed by [`post_full`](Self::post_full),
/// [`release`](Self::release) or [`into_shared`](Self::into_shared), so a
/// wrapper is always held by at most one owner.
#[derive(Debug)]
pub struct WrapperToken<T> {
    id: WrapperId,
    rank: u64,
    inner: Arc<Inner<T>>,
}

impl<T: Send> WrapperToken<T> {
    /// Slot identity, stable for the life of the pool.
    pub fn id(&self) -> WrapperId {
        self.id
    }

    /// Producer-assigned dispatch priority (lower dispatches first).
    pub fn rank(&self) -> u64 {
        self.rank
    }

    /// Sets the dispatch priority used by the next [`post_full`](Self::post_full).
    pub fn set_rank(&mut self, rank: u64) {
        self.rank = rank;
    }

    /// Shared access to the payload.
    pub fn payload(&self) -> &T {
        // SAFETY: this token is the unique capability for slot `self.id`
        // (see the ownership protocol above); the borrow is tied to the
        // token, so no `&mut T` can coexist with it.
        unsafe { &*self.inner.payloads[self.id].get() }
    }

    /// Exclusive access to the payload.
    pub fn payload_mut(&mut self) -> &mut T {
        // SAFETY: as above, plus the `&mut self` receiver guarantees no
        // other payload borrow from this token is live.
        unsafe { &mut *self.inner.payloads[self.id].get() }
    }

    /// Posts the wrapper to the full queue, rank-ordered.
    pub fn post_full(self) -> Result<(), ResourceError> {
        let full = self.inner.full.as_ref().ok_or(ResourceError::NoFullQueue)?;
        full.push_object(self.id, self.rank);
        Ok(())
    }

    /// Drops one logical reference; the last enabled release retires the
    /// wrapper to the front of the empty queue.
    pub fn release(self) {
        release_wrapper(&self.inner, self.id);
    }

    /// Adds `n` logical references, for handing the wrapper to multiple
    /// downstream holders before the first release.
    pub fn inc_live(&self, n: u64) {
        inc_live(&self.inner, self.id, n);
    }

    /// Allows the wrapper to retire when its live count reaches zero.
    pub fn enable_release(&self) {
        set_release_enable(&self.inner, self.id, true);
    }

    /// Pins the wrapper: it stays out of the empty pool even at live count
    /// zero until re-enabled.
    pub fn disable_release(&self) {
        set_release_enable(&self.inner, self.id, false);
    }

    /// Converts this unique token into a clonable lifecycle handle.
    ///
    /// Payload access ends here; pair with [`inc_live`](Self::inc_live) to
    /// account for every holder.
    pub fn into_shared(self) -> ObjectRef<T> {
        ObjectRef {
            id: self.id,
            inner: self.inner,
        }
    }
}

/// Clonable lifecycle handle to a pooled wrapper: release and fence
/// operations only, no payload access.
#[derive(Debug)]
pub struct ObjectRef<T> {
    id: WrapperId,
    inner: Arc<Inner<T>>,
}

impl<T> Clone for ObjectRef<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send> ObjectRef<T> {
    /// Slot identity, stable for the life of the pool.
    pub fn id(&self) -> WrapperId {
        self.id
    }

    /// Drops one logical reference; the last enabled release retires the
    /// wrapper to the front of the empty queue.
    pub fn release(self) {
        release_wrapper(&self.inner, self.id);
    }

    /// Adds `n` logical references.
    pub fn inc_live(&self, n: u64) {
        inc_live(&self.inner, self.id, n);
    }

    /// Allows the wrapper to retire when its live count reaches zero.
    pub fn enable_release(&self) {
        set_release_enable(&self.inner, self.id, true);
    }

    /// Pins the wrapper even at live count zero.
    pub fn disable_release(&self) {
        set_release_enable(&self.inner, self.id, false);
    }
}

fn release_wrapper<T: Send>(inner: &Inner<T>, id: WrapperId) {
    let retire = {
        let mut meta = inner.meta.lock().expect("pool mutex poisoned");
        let meta = &mut meta[id];
        assert!(
            meta.live_count != RELEASED_SENTINEL,
            "release of an already-released wrapper"
        );

        // Saturating decrement: a zero-count wrapper released once retires
        // immediately (the single-consumer fast path).
        meta.live_count = meta.live_count.saturating_sub(1);

        if meta.release_enable && meta.live_count == 0 {
            meta.live_count = RELEASED_SENTINEL;
            true
        } else {
            false
        }
    };

    if retire {
        inner.empty.push_object_front(id);
    }
}

fn inc_live<T: Send>(inner: &Inner<T>, id: WrapperId, n: u64) {
    let mut meta = inner.meta.lock().expect("pool mutex poisoned");
    debug_assert_live_count!(meta[id].live_count);
    meta[id].live_count += n;
}

fn set_release_enable<T: Send>(inner: &Inner<T>, id: WrapperId, enable: bool) {
    let mut meta = inner.meta.lock().expect("pool mutex poisoned");
    meta[id].release_enable = enable;
}
