//! Unbounded FIFO work queue.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use petrel_api::errors::Interrupted;
use petrel_api::interrupt::{Interrupt, Wake};
use petrel_api::queue::WorkQueue;
use petrel_api::task::Task;

struct Shared<T: Task> {
    slots: Mutex<VecDeque<Arc<T>>>,
    not_empty: Condvar,
}

impl<T: Task> Wake for Shared<T> {
    fn wake(&self) {
        // Taking the queue lock serializes the raise with a waiter's flag
        // check, so the notification cannot fall between check and wait.
        let _guard = self.slots.lock().unwrap();
        self.not_empty.notify_all();
    }
}

/// Unbounded FIFO queue backed by a mutex-guarded deque. `offer` always
/// succeeds; consumers block on a condvar.
pub struct LinkedWorkQueue<T: Task> {
    shared: Arc<Shared<T>>,
}

impl<T: Task> LinkedWorkQueue<T> {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                slots: Mutex::new(VecDeque::new()),
                not_empty: Condvar::new(),
            }),
        }
    }

    fn wake_target(&self) -> Arc<dyn Wake> {
        self.shared.clone()
    }
}

impl<T: Task> Default for LinkedWorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Task> WorkQueue<T> for LinkedWorkQueue<T> {
    fn offer(&self, task: Arc<T>) -> bool {
        let mut slots = self.shared.slots.lock().unwrap();
        slots.push_back(task);
        self.shared.not_empty.notify_one();
        true
    }

    fn offer_timeout(&self, task: Arc<T>, _timeout: Duration) -> bool {
        self.offer(task)
    }

    fn take(&self, signal: &Interrupt) -> Result<Arc<T>, Interrupted> {
        let _wait = signal.wait_in(self.wake_target());
        let mut slots = self.shared.slots.lock().unwrap();
        loop {
            if let Some(task) = slots.pop_front() {
                return Ok(task);
            }
            if signal.consume() {
                return Err(Interrupted);
            }
            slots = self.shared.not_empty.wait(slots).unwrap();
        }
    }

    fn poll(&self, timeout: Duration, signal: &Interrupt) -> Result<Option<Arc<T>>, Interrupted> {
        let _wait = signal.wait_in(self.wake_target());
        let deadline = Instant::now() + timeout;
        let mut slots = self.shared.slots.lock().unwrap();
        loop {
            if let Some(task) = slots.pop_front() {
                return Ok(Some(task));
            }
            if signal.consume() {
                return Err(Interrupted);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let (guard, _) = self
                .shared
                .not_empty
                .wait_timeout(slots, deadline - now)
                .unwrap();
            slots = guard;
        }
    }

    fn try_take(&self) -> Option<Arc<T>> {
        self.shared.slots.lock().unwrap().pop_front()
    }

    fn len(&self) -> usize {
        self.shared.slots.lock().unwrap().len()
    }

    fn remove(&self, task: &Arc<T>) -> bool {
        let mut slots = self.shared.slots.lock().unwrap();
        match slots.iter().position(|queued| Arc::ptr_eq(queued, task)) {
            Some(index) => {
                slots.remove(index);
                true
            }
            None => false,
        }
    }

    fn drain(&self) -> Vec<Arc<T>> {
        let mut slots = self.shared.slots.lock().unwrap();
        slots.drain(..).collect()
    }

    fn retain(&self, keep: &mut dyn FnMut(&Arc<T>) -> bool) {
        self.shared.slots.lock().unwrap().retain(|task| keep(task));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    struct Tagged(usize);

    impl Task for Tagged {
        fn run(&self) {}
    }

    #[test]
    fn fifo_order() {
        let queue = LinkedWorkQueue::new();
        for n in 0..3 {
            assert!(queue.offer(Arc::new(Tagged(n))));
        }
        assert_eq!(queue.len(), 3);

        let signal = Interrupt::new();
        for n in 0..3 {
            assert_eq!(queue.take(&signal).unwrap().0, n);
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn poll_times_out_when_empty() {
        let queue: LinkedWorkQueue<Tagged> = LinkedWorkQueue::new();
        let signal = Interrupt::new();
        let polled = queue.poll(Duration::from_millis(20), &signal).unwrap();
        assert!(polled.is_none());
    }

    #[test]
    fn interrupt_wakes_blocked_take() {
        let queue: Arc<LinkedWorkQueue<Tagged>> = Arc::new(LinkedWorkQueue::new());
        let signal = Interrupt::new();
        let woken = Arc::new(AtomicUsize::new(0));

        let consumer = {
            let queue = queue.clone();
            let signal = signal.clone();
            let woken = woken.clone();
            thread::spawn(move || {
                assert!(matches!(queue.take(&signal), Err(Interrupted)));
                woken.fetch_add(1, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(50));
        signal.raise();
        consumer.join().unwrap();
        assert_eq!(woken.load(Ordering::SeqCst), 1);
        // The raise was consumed by the wait.
        assert!(!signal.is_raised());
    }

    #[test]
    fn remove_matches_by_identity() {
        let queue = LinkedWorkQueue::new();
        let first = Arc::new(Tagged(1));
        let twin = Arc::new(Tagged(1));
        queue.offer(first.clone());

        assert!(!queue.remove(&twin));
        assert!(queue.remove(&first));
        assert!(!queue.remove(&first));
        assert!(queue.is_empty());
    }

    #[test]
    fn drain_empties_the_queue() {
        let queue = LinkedWorkQueue::new();
        for n in 0..4 {
            queue.offer(Arc::new(Tagged(n)));
        }
        let drained = queue.drain();
        assert_eq!(drained.len(), 4);
        assert!(queue.is_empty());
    }

    #[test]
    fn retain_filters_in_place() {
        let queue = LinkedWorkQueue::new();
        for n in 0..4 {
            queue.offer(Arc::new(Tagged(n)));
        }
        queue.retain(&mut |task| task.0 % 2 == 0);
        assert_eq!(queue.len(), 2);
    }
}
