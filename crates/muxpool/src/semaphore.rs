use std::sync::{Condvar, Mutex};

/// Counting semaphore with cooperative closure.
///
/// The fabric parks workers here: a post corresponds to exactly one wrapper
/// linked into the paired FIFO, so the permit count always equals the FIFO
/// length. `close` wakes every waiter; pending permits are still drained
/// before closure is reported, so shutdown never drops queued work.
#[derive(Debug)]
pub(crate) struct CountingSemaphore {
    state: Mutex<SemState>,
    available: Condvar,
}

#[derive(Debug)]
struct SemState {
    permits: usize,
    closed: bool,
}

impl CountingSemaphore {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(SemState {
                permits: 0,
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Adds one permit and wakes a waiter.
    pub(crate) fn post(&self) {
        let mut state = self.state.lock().expect("semaphore mutex poisoned");
        state.permits += 1;
        drop(state);
        self.available.notify_one();
    }

    /// Blocks until a permit is available and takes it.
    ///
    /// Returns `false` once the semaphore is closed and all remaining
    /// permits have been consumed.
    pub(crate) fn wait(&self) -> bool {
        let mut state = self.state.lock().expect("semaphore mutex poisoned");
        loop {
            if state.permits > 0 {
                state.permits -= 1;
                return true;
            }
            if state.closed {
                return false;
            }
            state = self
                .available
                .wait(state)
                .expect("semaphore mutex poisoned");
        }
    }

    /// Closes the semaphore and wakes every waiter.
    pub(crate) fn close(&self) {
        let mut state = self.state.lock().expect("semaphore mutex poisoned");
        state.closed = true;
        drop(state);
        self.available.notify_all();
    }

    /// Current permit count (diagnostics only).
    #[cfg(test)]
    pub(crate) fn permits(&self) -> usize {
        self.state.lock().expect("semaphore mutex poisoned").permits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_post_then_wait() {
        let sem = CountingSemaphore::new();
        sem.post();
        sem.post();
        assert_eq!(sem.permits(), 2);
        assert!(sem.wait());
        assert!(sem.wait());
        assert_eq!(sem.permits(), 0);
    }

    #[test]
    fn test_wait_blocks_until_post() {
        let sem = Arc::new(CountingSemaphore::new());

        let waiter = {
            let sem = Arc::clone(&sem);
            thread::spawn(move || sem.wait())
        };

        thread::sleep(Duration::from_millis(20));
        sem.post();
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_close_wakes_blocked_waiter() {
        let sem = Arc::new(CountingSemaphore::new());

        let waiter = {
            let sem = Arc::clone(&sem);
            thread::spawn(move || sem.wait())
        };

        thread::sleep(Duration::from_millis(20));
        sem.close();
        assert!(!waiter.join().unwrap());
    }

    #[test]
    fn test_close_drains_pending_permits_first() {
        let sem = CountingSemaphore::new();
        sem.post();
        sem.close();

        // The queued permit is still handed out before closure is reported.
        assert!(sem.wait());
        assert!(!sem.wait());
    }
}
