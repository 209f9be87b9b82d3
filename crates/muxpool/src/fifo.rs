use crate::semaphore::CountingSemaphore;
use crate::WrapperId;
use crossbeam_utils::CachePadded;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Per-worker FIFO: the parking spot where a dispatched wrapper meets its
/// worker.
///
/// The muxing queue pushes under the list mutex and posts the semaphore;
/// the owning worker waits on the semaphore and pops under the mutex. The
/// permit count therefore always equals the queue length, so a granted
/// permit guarantees a non-empty pop.
#[derive(Debug)]
pub(crate) struct WorkerFifo {
    queue: CachePadded<Mutex<VecDeque<WrapperId>>>,
    semaphore: CountingSemaphore,
    stats: Option<Mutex<WaitStats>>,
}

#[derive(Debug, Default, Clone, Copy)]
struct WaitStats {
    wait_count: u64,
    total_wait: Duration,
    max_wait: Duration,
}

/// Snapshot of blocking-pop wait diagnostics for one worker FIFO.
#[derive(Debug, Default, Clone, Copy)]
pub struct WaitStatsSnapshot {
    /// Number of blocking pops performed.
    pub wait_count: u64,
    /// Cumulative time spent blocked.
    pub total_wait: Duration,
    /// Longest single wait.
    pub max_wait: Duration,
}

impl WorkerFifo {
    pub(crate) fn new(capacity: usize, enable_metrics: bool) -> Self {
        Self {
            queue: CachePadded::new(Mutex::new(VecDeque::with_capacity(capacity))),
            semaphore: CountingSemaphore::new(),
            stats: enable_metrics.then(|| Mutex::new(WaitStats::default())),
        }
    }

    /// Links a wrapper and posts the wake-up edge. Called by `assign` only.
    pub(crate) fn push(&self, id: WrapperId) {
        self.queue.lock().expect("fifo mutex poisoned").push_back(id);
        self.semaphore.post();
    }

    /// Blocks until a wrapper is available, or `None` once closed and
    /// drained.
    pub(crate) fn pop_blocking(&self) -> Option<WrapperId> {
        let start = self.stats.as_ref().map(|_| Instant::now());

        if !self.semaphore.wait() {
            return None;
        }

        let id = self
            .queue
            .lock()
            .expect("fifo mutex poisoned")
            .pop_front()
            .expect("semaphore permit without a queued wrapper");

        if let (Some(stats), Some(start)) = (self.stats.as_ref(), start) {
            let waited = start.elapsed();
            let mut stats = stats.lock().expect("fifo stats mutex poisoned");
            stats.wait_count += 1;
            stats.total_wait += waited;
            if waited > stats.max_wait {
                stats.max_wait = waited;
            }
        }

        Some(id)
    }

    /// Non-blocking emptiness peek, for the non-blocking full-side pop.
    pub(crate) fn is_empty(&self) -> bool {
        self.queue.lock().expect("fifo mutex poisoned").is_empty()
    }

    pub(crate) fn close(&self) {
        self.semaphore.close();
    }

    pub(crate) fn stats_snapshot(&self) -> Option<WaitStatsSnapshot> {
        let stats = self.stats.as_ref()?;
        let stats = stats.lock().expect("fifo stats mutex poisoned");
        Some(WaitStatsSnapshot {
            wait_count: stats.wait_count,
            total_wait: stats.total_wait,
            max_wait: stats.max_wait,
        })
    }
}
