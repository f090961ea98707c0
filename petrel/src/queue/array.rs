//! Bounded FIFO work queue.

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
    not_full: Condvar,
    capacity: usize,
}

impl<T: Task> Wake for Shared<T> {
    fn wake(&self) {
        let _guard = self.slots.lock().unwrap();
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }
}

/// Fixed-capacity FIFO queue. `offer` fails once the capacity is reached;
/// `offer_timeout` waits for space.
pub struct ArrayWorkQueue<T: Task> {
    shared: Arc<Shared<T>>,
}

impl<T: Task> ArrayWorkQueue<T> {
    /// Creates a queue holding at most `capacity` tasks.
    ///
    /// # Panics
    /// Panics if `capacity` is zero; use
    /// [`SyncHandoffQueue`](super::SyncHandoffQueue) for direct hand-off.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be greater than zero");
        Self {
            shared: Arc::new(Shared {
                slots: Mutex::new(VecDeque::with_capacity(capacity)),
                not_empty: Condvar::new(),
                not_full: Condvar::new(),
                capacity,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    fn wake_target(&self) -> Arc<dyn Wake> {
        self.shared.clone()
    }
}

impl<T: Task> WorkQueue<T> for ArrayWorkQueue<T> {
    fn offer(&self, task: Arc<T>) -> bool {
        let mut slots = self.shared.slots.lock().unwrap();
        if slots.len() >= self.shared.capacity {
            return false;
        }
        slots.push_back(task);
        self.shared.not_empty.notify_one();
        true
    }

    fn offer_timeout(&self, task: Arc<T>, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut slots = self.shared.slots.lock().unwrap();
        loop {
            if slots.len() < self.shared.capacity {
                slots.push_back(task);
                self.shared.not_empty.notify_one();
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .shared
                .not_full
                .wait_timeout(slots, deadline - now)
                .unwrap();
            slots = guard;
        }
    }

    fn take(&self, signal: &Interrupt) -> Result<Arc<T>, Interrupted> {
        let _wait = signal.wait_in(self.wake_target());
        let mut slots = self.shared.slots.lock().unwrap();
        loop {
            if let Some(task) = slots.pop_front() {
                self.shared.not_full.notify_one();
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
                self.shared.not_full.notify_one();
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
        let mut slots = self.shared.slots.lock().unwrap();
        let task = slots.pop_front();
        if task.is_some() {
            self.shared.not_full.notify_one();
        }
        task
    }

    fn len(&self) -> usize {
        self.shared.slots.lock().unwrap().len()
    }

    fn remove(&self, task: &Arc<T>) -> bool {
        let mut slots = self.shared.slots.lock().unwrap();
        match slots.iter().position(|queued| Arc::ptr_eq(queued, task)) {
            Some(index) => {
                slots.remove(index);
                self.shared.not_full.notify_one();
                true
            }
            None => false,
        }
    }

    fn drain(&self) -> Vec<Arc<T>> {
        let mut slots = self.shared.slots.lock().unwrap();
        let drained: Vec<_> = slots.drain(..).collect();
        self.shared.not_full.notify_all();
        drained
    }

    fn retain(&self, keep: &mut dyn FnMut(&Arc<T>) -> bool) {
        let mut slots = self.shared.slots.lock().unwrap();
        slots.retain(|task| keep(task));
        self.shared.not_full.notify_all();
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
    fn offer_fails_at_capacity() {
        let queue = ArrayWorkQueue::new(2);
        assert!(queue.offer(Arc::new(Tagged(0))));
        assert!(queue.offer(Arc::new(Tagged(1))));
        assert!(!queue.offer(Arc::new(Tagged(2))));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn offer_timeout_waits_for_space() {
        let queue = Arc::new(ArrayWorkQueue::new(1));
        queue.offer(Arc::new(Tagged(0)));

        let consumer = {
            let queue = queue.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                queue.try_take()
            })
        };

        assert!(queue.offer_timeout(Arc::new(Tagged(1)), Duration::from_secs(5)));
        assert!(consumer.join().unwrap().is_some());
    }

    #[test]
    fn offer_timeout_expires_when_full() {
        let queue = ArrayWorkQueue::new(1);
        queue.offer(Arc::new(Tagged(0)));
        assert!(!queue.offer_timeout(Arc::new(Tagged(1)), Duration::from_millis(20)));
    }

    #[test]
    fn take_hands_out_in_order() {
        let queue = ArrayWorkQueue::new(4);
        for n in 0..4 {
            queue.offer(Arc::new(Tagged(n)));
        }
        let signal = Interrupt::new();
        for n in 0..4 {
            assert_eq!(queue.take(&signal).unwrap().0, n);
        }
    }

    #[test]
    #[should_panic(expected = "capacity must be greater than zero")]
    fn zero_capacity_is_refused() {
        let _ = ArrayWorkQueue::<Tagged>::new(0);
    }
}
