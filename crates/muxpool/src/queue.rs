use crate::fifo::{WaitStatsSnapshot, WorkerFifo};
use crate::invariants::debug_assert_dispatch_settled;
use crate::ring::OrderedRing;
use crate::WrapperId;
use std::sync::Mutex;

/// Muxing queue: pending wrappers on one ring, idle workers on the other.
///
/// Dispatch happens whenever both rings are non-empty: the frontmost idle
/// worker receives the lowest-rank pending wrapper through its FIFO.
/// Producers insert by rank, so the oldest work always dispatches first;
/// idle workers queue FIFO among themselves, so dispatch is fair across
/// symmetric workers.
#[derive(Debug)]
pub(crate) struct MuxingQueue {
    state: Mutex<MuxState>,
    fifos: Box<[WorkerFifo]>,
}

#[derive(Debug)]
struct MuxState {
    objects: OrderedRing<WrapperId>,
    workers: OrderedRing<usize>,
    /// One flag per worker: true while that worker sits in the idle ring.
    /// A worker re-announcing itself (the non-blocking pop path does this)
    /// stays queued once instead of accumulating duplicate entries.
    idle: Box<[bool]>,
}

impl MuxingQueue {
    pub(crate) fn new(object_count: usize, worker_count: usize, enable_metrics: bool) -> Self {
        let fifos = (0..worker_count)
            .map(|_| WorkerFifo::new(object_count, enable_metrics))
            .collect::<Vec<_>>();
        Self {
            state: Mutex::new(MuxState {
                objects: OrderedRing::with_capacity(object_count),
                workers: OrderedRing::with_capacity(worker_count),
                idle: vec![false; worker_count].into_boxed_slice(),
            }),
            fifos: fifos.into_boxed_slice(),
        }
    }

    /// Rank-inserts a wrapper into the object ring and dispatches.
    pub(crate) fn push_object(&self, id: WrapperId, rank: u64) {
        let mut state = self.state.lock().expect("muxing queue mutex poisoned");
        state.objects.ranked_insert(id, rank);
        Self::assign(&mut state, &self.fifos);
    }

    /// Returns a wrapper to the front of the object ring and dispatches.
    ///
    /// Front insertion keeps just-released wrappers hot: they are reused
    /// before colder pool mates.
    pub(crate) fn push_object_front(&self, id: WrapperId) {
        let mut state = self.state.lock().expect("muxing queue mutex poisoned");
        state.objects.push_front(id);
        Self::assign(&mut state, &self.fifos);
    }

    /// Announces a worker as idle and dispatches.
    pub(crate) fn enqueue_idle_worker(&self, worker: usize) {
        let mut state = self.state.lock().expect("muxing queue mutex poisoned");
        if !state.idle[worker] {
            state.idle[worker] = true;
            state.workers.push_back(worker);
        }
        Self::assign(&mut state, &self.fifos);
    }

    /// Pairs pending wrappers with idle workers while both exist.
    ///
    /// Runs under the muxing mutex; the per-FIFO mutex is taken inside,
    /// never the other way around.
    fn assign(state: &mut MuxState, fifos: &[WorkerFifo]) {
        while !state.objects.is_empty() && !state.workers.is_empty() {
            let worker = state.workers.pop_front().expect("idle ring unexpectedly empty");
            let id = state.objects.pop_front().expect("object ring unexpectedly empty");
            state.idle[worker] = false;
            fifos[worker].push(id);
        }
        debug_assert_dispatch_settled!(state.objects.is_empty(), state.workers.is_empty());
    }

    pub(crate) fn fifo(&self, worker: usize) -> &WorkerFifo {
        &self.fifos[worker]
    }

    pub(crate) fn close(&self) {
        for fifo in self.fifos.iter() {
            fifo.close();
        }
    }

    pub(crate) fn wait_stats(&self, worker: usize) -> Option<WaitStatsSnapshot> {
        self.fifos.get(worker)?.stats_snapshot()
    }
}
