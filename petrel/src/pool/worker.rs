//! Per-thread worker state and the worker run loop.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

use petrel_api::interrupt::{self, Interrupt};
use petrel_api::task::{Task, TaskPanic};

use super::control::RunState;
use super::executor::Inner;

// Execution flag states. PINNED is held briefly by an interrupter so that
// idle-interrupt delivery can never land on a worker already committed to
// running a task.
const IDLE: u8 = 0;
const BUSY: u8 = 1;
const PINNED: u8 = 2;

/// State owned by one worker thread. Created once, never reused after the
/// thread exits.
pub(crate) struct WorkerSlot<T: Task> {
    pub(crate) id: usize,
    /// Interruption token for this worker's thread.
    pub(crate) interrupt: Interrupt,
    /// Three-state execution guard: IDLE, BUSY, or transiently PINNED.
    exec: AtomicU8,
    /// Tasks completed by this worker, folded into the pool total on exit.
    completed: AtomicU64,
    /// Task handed over by the admission protocol, consumed once.
    first_task: Mutex<Option<Arc<T>>>,
}

impl<T: Task> WorkerSlot<T> {
    pub(crate) fn new(id: usize, first_task: Option<Arc<T>>) -> Self {
        Self {
            id,
            interrupt: Interrupt::new(),
            exec: AtomicU8::new(IDLE),
            completed: AtomicU64::new(0),
            first_task: Mutex::new(first_task),
        }
    }

    pub(crate) fn take_first_task(&self) -> Option<Arc<T>> {
        self.first_task.lock().unwrap().take()
    }

    pub(crate) fn has_first_task(&self) -> bool {
        self.first_task.lock().unwrap().is_some()
    }

    pub(crate) fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Whether this worker is currently executing a task.
    pub(crate) fn is_busy(&self) -> bool {
        self.exec.load(Ordering::Acquire) == BUSY
    }

    /// Delivers an interrupt only if the worker is idle. Pins the execution
    /// flag for the duration of delivery so the worker cannot begin a task
    /// mid-raise.
    pub(crate) fn interrupt_if_idle(&self) -> bool {
        if self
            .exec
            .compare_exchange(IDLE, PINNED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.interrupt.raise();
            self.exec.store(IDLE, Ordering::Release);
            true
        } else {
            false
        }
    }

    fn begin_execution(&self) {
        // Spin through a transient PINNED while an interrupter finishes.
        loop {
            match self
                .exec
                .compare_exchange(IDLE, BUSY, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return,
                Err(_) => std::hint::spin_loop(),
            }
        }
    }

    fn end_execution(&self) {
        self.exec.store(IDLE, Ordering::Release);
    }
}

/// Worker thread entry point: repeatedly fetch a task and run it between
/// the lifecycle hooks, until task retrieval says the worker must retire or
/// a hook failure kills it.
pub(crate) fn run<T: Task>(inner: Arc<Inner<T>>, slot: Arc<WorkerSlot<T>>) {
    let _token = interrupt::install(slot.interrupt.clone());
    debug!(worker = slot.id, "worker started");

    let mut task = slot.take_first_task();
    let mut abrupt = false;
    loop {
        let current = match task.take() {
            Some(t) => t,
            None => match inner.get_task(&slot) {
                Some(t) => t,
                None => break,
            },
        };

        slot.begin_execution();
        // A pending idle interrupt must not leak into the task unless the
        // pool is stopping. A raise landing between this clear and the task
        // body may be deferred until the next task.
        if inner.run_state() < RunState::Stop {
            slot.interrupt.consume();
        }
        if run_guarded(&inner, &slot, &current).is_err() {
            abrupt = true;
            break;
        }
    }

    debug!(worker = slot.id, abrupt, "worker exiting");
    Inner::process_worker_exit(&inner, &slot, abrupt);
}

/// Runs one task between the before/after hooks with the execution flag
/// held. `Err` means a hook panicked and the worker must die abruptly; a
/// panic in the task body itself is captured and handed to `after_execute`.
fn run_guarded<T: Task>(
    inner: &Inner<T>,
    slot: &WorkerSlot<T>,
    task: &Arc<T>,
) -> Result<(), ()> {
    let result = (|| {
        let thread = std::thread::current();
        if panic::catch_unwind(AssertUnwindSafe(|| {
            inner.hooks().run_before(&thread, task.as_ref())
        }))
        .is_err()
        {
            return Err(());
        }

        let captured = panic::catch_unwind(AssertUnwindSafe(|| task.run()))
            .err()
            .map(TaskPanic::new);
        if let Some(p) = &captured {
            debug!(
                worker = slot.id,
                message = p.message().unwrap_or("<non-string payload>"),
                "task panicked"
            );
        }

        if panic::catch_unwind(AssertUnwindSafe(|| {
            inner.hooks().run_after(task.as_ref(), captured.as_ref())
        }))
        .is_err()
        {
            return Err(());
        }
        Ok(())
    })();

    slot.completed.fetch_add(1, Ordering::Relaxed);
    slot.end_execution();
    result
}
