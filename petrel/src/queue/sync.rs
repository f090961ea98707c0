//! Zero-capacity hand-off queue.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use petrel_api::errors::Interrupted;
use petrel_api::interrupt::{Interrupt, Wake};
use petrel_api::queue::WorkQueue;
use petrel_api::task::Task;

struct Rendezvous<T: Task> {
    /// Consumers currently committed to a blocking take/poll.
    waiting_takers: usize,
    /// The task in flight between a producer and a consumer.
    item: Option<Arc<T>>,
}

struct Shared<T: Task> {
    state: Mutex<Rendezvous<T>>,
    transfer: Condvar,
}

impl<T: Task> Wake for Shared<T> {
    fn wake(&self) {
        let _guard = self.state.lock().unwrap();
        self.transfer.notify_all();
    }
}

/// Direct hand-off queue with no storage: an insert succeeds only while a
/// consumer is committed waiting, so every accepted task pairs immediately
/// with a worker. The pool sees it as (almost always) empty, which makes
/// submissions spill into new workers up to the maximum, then reject.
pub struct SyncHandoffQueue<T: Task> {
    shared: Arc<Shared<T>>,
}

impl<T: Task> SyncHandoffQueue<T> {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(Rendezvous {
                    waiting_takers: 0,
                    item: None,
                }),
                transfer: Condvar::new(),
            }),
        }
    }

    fn wake_target(&self) -> Arc<dyn Wake> {
        self.shared.clone()
    }
}

impl<T: Task> Default for SyncHandoffQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Task> WorkQueue<T> for SyncHandoffQueue<T> {
    fn offer(&self, task: Arc<T>) -> bool {
        let mut state = self.shared.state.lock().unwrap();
        if state.waiting_takers == 0 || state.item.is_some() {
            return false;
        }
        state.item = Some(task);
        self.shared.transfer.notify_all();
        true
    }

    fn offer_timeout(&self, task: Arc<T>, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock().unwrap();
        loop {
            if state.waiting_takers > 0 && state.item.is_none() {
                state.item = Some(task);
                self.shared.transfer.notify_all();
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .shared
                .transfer
                .wait_timeout(state, deadline - now)
                .unwrap();
            state = guard;
        }
    }

    fn take(&self, signal: &Interrupt) -> Result<Arc<T>, Interrupted> {
        let _wait = signal.wait_in(self.wake_target());
        let mut state = self.shared.state.lock().unwrap();
        state.waiting_takers += 1;
        loop {
            if let Some(task) = state.item.take() {
                state.waiting_takers -= 1;
                // A producer waiting in offer_timeout can now deposit.
                self.shared.transfer.notify_all();
                return Ok(task);
            }
            if signal.consume() {
                state.waiting_takers -= 1;
                return Err(Interrupted);
            }
            state = self.shared.transfer.wait(state).unwrap();
        }
    }

    fn poll(&self, timeout: Duration, signal: &Interrupt) -> Result<Option<Arc<T>>, Interrupted> {
        let _wait = signal.wait_in(self.wake_target());
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock().unwrap();
        state.waiting_takers += 1;
        loop {
            if let Some(task) = state.item.take() {
                state.waiting_takers -= 1;
                self.shared.transfer.notify_all();
                return Ok(Some(task));
            }
            if signal.consume() {
                state.waiting_takers -= 1;
                return Err(Interrupted);
            }
            let now = Instant::now();
            if now >= deadline {
                state.waiting_takers -= 1;
                return Ok(None);
            }
            let (guard, _) = self
                .shared
                .transfer
                .wait_timeout(state, deadline - now)
                .unwrap();
            state = guard;
        }
    }

    fn try_take(&self) -> Option<Arc<T>> {
        let mut state = self.shared.state.lock().unwrap();
        let task = state.item.take();
        if task.is_some() {
            self.shared.transfer.notify_all();
        }
        task
    }

    fn len(&self) -> usize {
        let state = self.shared.state.lock().unwrap();
        usize::from(state.item.is_some())
    }

    fn remove(&self, task: &Arc<T>) -> bool {
        let mut state = self.shared.state.lock().unwrap();
        match &state.item {
            Some(queued) if Arc::ptr_eq(queued, task) => {
                state.item = None;
                true
            }
            _ => false,
        }
    }

    fn drain(&self) -> Vec<Arc<T>> {
        let mut state = self.shared.state.lock().unwrap();
        state.item.take().into_iter().collect()
    }

    fn retain(&self, keep: &mut dyn FnMut(&Arc<T>) -> bool) {
        let mut state = self.shared.state.lock().unwrap();
        if let Some(task) = &state.item {
            if !keep(task) {
                state.item = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    struct Tagged(usize);

    impl Task for Tagged {
        fn run(&self) {}
    }

    #[test]
    fn offer_without_a_taker_fails() {
        let queue = SyncHandoffQueue::new();
        assert!(!queue.offer(Arc::new(Tagged(0))));
        assert!(queue.is_empty());
    }

    #[test]
    fn offer_pairs_with_committed_taker() {
        let queue: Arc<SyncHandoffQueue<Tagged>> = Arc::new(SyncHandoffQueue::new());
        let signal = Interrupt::new();

        let consumer = {
            let queue = queue.clone();
            let signal = signal.clone();
            thread::spawn(move || queue.take(&signal).unwrap().0)
        };

        // Wait for the consumer to commit, then hand off.
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if queue.offer(Arc::new(Tagged(7))) {
                break;
            }
            assert!(Instant::now() < deadline, "no taker committed in time");
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(consumer.join().unwrap(), 7);
    }

    #[test]
    fn offer_timeout_waits_for_a_taker() {
        let queue: Arc<SyncHandoffQueue<Tagged>> = Arc::new(SyncHandoffQueue::new());

        let consumer = {
            let queue = queue.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                let signal = Interrupt::new();
                queue.take(&signal).unwrap().0
            })
        };

        assert!(queue.offer_timeout(Arc::new(Tagged(3)), Duration::from_secs(5)));
        assert_eq!(consumer.join().unwrap(), 3);
    }

    #[test]
    fn poll_times_out_without_a_producer() {
        let queue: SyncHandoffQueue<Tagged> = SyncHandoffQueue::new();
        let signal = Interrupt::new();
        assert!(queue
            .poll(Duration::from_millis(20), &signal)
            .unwrap()
            .is_none());
    }

    #[test]
    fn interrupt_wakes_blocked_taker() {
        let queue: Arc<SyncHandoffQueue<Tagged>> = Arc::new(SyncHandoffQueue::new());
        let signal = Interrupt::new();

        let consumer = {
            let queue = queue.clone();
            let signal = signal.clone();
            thread::spawn(move || queue.take(&signal))
        };

        thread::sleep(Duration::from_millis(50));
        signal.raise();
        assert!(matches!(consumer.join().unwrap(), Err(Interrupted)));
    }
}
