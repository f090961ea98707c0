//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use petrel::Task;

pub const DEFAULT_WAIT: Duration = Duration::from_secs(10);

/// Polls `predicate` until it holds or a deadline passes.
pub fn wait_for(predicate: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + DEFAULT_WAIT;
    while Instant::now() < deadline {
        if predicate() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    predicate()
}

/// Reusable open/closed gate for parking tasks mid-execution.
pub struct Gate {
    open: Mutex<bool>,
    changed: Condvar,
}

impl Gate {
    pub fn new() -> Arc<Gate> {
        Arc::new(Gate {
            open: Mutex::new(false),
            changed: Condvar::new(),
        })
    }

    pub fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.changed.notify_all();
    }

    pub fn wait(&self) {
        let deadline = Instant::now() + Duration::from_secs(30);
        let mut open = self.open.lock().unwrap();
        while !*open {
            let now = Instant::now();
            assert!(now < deadline, "gate never opened");
            let (guard, _) = self.changed.wait_timeout(open, deadline - now).unwrap();
            open = guard;
        }
    }
}

/// One task type covering every behavior the pool tests need, so a single
/// pool can mix them freely.
pub enum TestTask {
    /// Bumps a counter, optionally after a delay.
    Count {
        counter: Arc<AtomicUsize>,
        delay: Duration,
    },
    /// Records its start, parks on a gate, then records completion.
    Gate {
        gate: Arc<Gate>,
        started: Arc<AtomicUsize>,
        finished: Arc<AtomicUsize>,
    },
    /// Records its start, then spins until the worker's interrupt token is
    /// raised.
    Interruptible { started: Arc<AtomicUsize> },
    /// Tracks the peak number of concurrently running instances.
    Concurrency {
        current: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
        done: Arc<AtomicUsize>,
        hold: Duration,
    },
    /// No-op that reports itself cancelled, for purge tests.
    Cancelled,
}

impl TestTask {
    pub fn count(counter: &Arc<AtomicUsize>) -> Arc<TestTask> {
        Arc::new(TestTask::Count {
            counter: counter.clone(),
            delay: Duration::ZERO,
        })
    }

    pub fn count_delayed(counter: &Arc<AtomicUsize>, delay: Duration) -> Arc<TestTask> {
        Arc::new(TestTask::Count {
            counter: counter.clone(),
            delay,
        })
    }

    pub fn gate(
        gate: &Arc<Gate>,
        started: &Arc<AtomicUsize>,
        finished: &Arc<AtomicUsize>,
    ) -> Arc<TestTask> {
        Arc::new(TestTask::Gate {
            gate: gate.clone(),
            started: started.clone(),
            finished: finished.clone(),
        })
    }

    pub fn interruptible(started: &Arc<AtomicUsize>) -> Arc<TestTask> {
        Arc::new(TestTask::Interruptible {
            started: started.clone(),
        })
    }

    pub fn concurrency(
        current: &Arc<AtomicUsize>,
        peak: &Arc<AtomicUsize>,
        done: &Arc<AtomicUsize>,
        hold: Duration,
    ) -> Arc<TestTask> {
        Arc::new(TestTask::Concurrency {
            current: current.clone(),
            peak: peak.clone(),
            done: done.clone(),
            hold,
        })
    }

    pub fn cancelled() -> Arc<TestTask> {
        Arc::new(TestTask::Cancelled)
    }
}

impl Task for TestTask {
    fn run(&self) {
        match self {
            TestTask::Count { counter, delay } => {
                if !delay.is_zero() {
                    std::thread::sleep(*delay);
                }
                counter.fetch_add(1, Ordering::SeqCst);
            }
            TestTask::Gate {
                gate,
                started,
                finished,
            } => {
                started.fetch_add(1, Ordering::SeqCst);
                gate.wait();
                finished.fetch_add(1, Ordering::SeqCst);
            }
            TestTask::Interruptible { started } => {
                started.fetch_add(1, Ordering::SeqCst);
                while !petrel::interrupt::requested() {
                    std::thread::sleep(Duration::from_millis(1));
                }
            }
            TestTask::Concurrency {
                current,
                peak,
                done,
                hold,
            } => {
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(*hold);
                current.fetch_sub(1, Ordering::SeqCst);
                done.fetch_add(1, Ordering::SeqCst);
            }
            TestTask::Cancelled => {}
        }
    }

    fn is_cancelled(&self) -> bool {
        matches!(self, TestTask::Cancelled)
    }
}
