//! The executor: admission, task retrieval, shutdown sequencing, and the
//! pool manager.
//!
//! Three pieces of concurrently mutated state are kept consistent here:
//! the control word (run state + admitted worker count, lock-free), the
//! worker set with its statistics (one coarse mutex), and the work queue
//! (its own internal synchronization). The control word is the source of
//! truth; the worker set follows it, and every transient disagreement is
//! resolved by a CAS retry rather than surfaced as an error.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, error, warn};

use petrel_api::errors::{ConfigError, RejectedExecutionError};
use petrel_api::factory::ThreadFactory;
use petrel_api::queue::WorkQueue;
use petrel_api::task::{Job, Task};

use super::config::{Hooks, PoolConfig, ThreadPoolBuilder};
use super::control::{CAPACITY, ControlCell, Ctl, RunState};
use super::reject::RejectionHandler;
use super::worker::{self, WorkerSlot};

/// Worker set and statistics guarded by the coarse pool lock.
struct PoolGuarded<T: Task> {
    workers: HashMap<usize, Arc<WorkerSlot<T>>>,
    largest_pool_size: usize,
    completed_tasks: u64,
}

pub(crate) struct Inner<T: Task> {
    name: String,
    ctl: ControlCell,
    queue: Box<dyn WorkQueue<T>>,
    main: Mutex<PoolGuarded<T>>,
    /// Signalled (with `main` held) when the pool reaches TERMINATED.
    termination: Condvar,
    core_pool_size: AtomicUsize,
    maximum_pool_size: AtomicUsize,
    keep_alive_nanos: AtomicU64,
    allow_core_thread_timeout: AtomicBool,
    factory: Mutex<Arc<dyn ThreadFactory>>,
    handler: Mutex<Arc<dyn RejectionHandler<T>>>,
    hooks: Hooks<T>,
    next_worker_id: AtomicUsize,
}

/// A dynamically sized pool of worker threads executing submitted tasks.
///
/// The pool accepts tasks while running, can be shut down in an orderly
/// fashion (queued tasks still run) or immediately (queued tasks are
/// returned), and reports full termination once every worker has exited.
///
/// Owners must shut the pool down explicitly; dropping a running pool
/// leaves its workers alive and logs a warning.
pub struct ThreadPool<T: Task> {
    inner: Arc<Inner<T>>,
}

impl<T: Task> ThreadPool<T> {
    pub fn builder() -> ThreadPoolBuilder<T> {
        ThreadPoolBuilder::new()
    }

    /// Creates a pool with the default factory and abort rejection policy.
    pub fn new(config: PoolConfig, queue: Box<dyn WorkQueue<T>>) -> Result<Self, ConfigError> {
        ThreadPoolBuilder::new().config(config).build(queue)
    }

    pub(crate) fn from_parts(
        name: String,
        config: PoolConfig,
        queue: Box<dyn WorkQueue<T>>,
        factory: Arc<dyn ThreadFactory>,
        handler: Arc<dyn RejectionHandler<T>>,
        hooks: Hooks<T>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                name,
                ctl: ControlCell::new(),
                queue,
                main: Mutex::new(PoolGuarded {
                    workers: HashMap::new(),
                    largest_pool_size: 0,
                    completed_tasks: 0,
                }),
                termination: Condvar::new(),
                core_pool_size: AtomicUsize::new(config.core_pool_size),
                maximum_pool_size: AtomicUsize::new(config.maximum_pool_size),
                keep_alive_nanos: AtomicU64::new(duration_to_nanos(config.keep_alive)),
                allow_core_thread_timeout: AtomicBool::new(config.allow_core_thread_timeout),
                factory: Mutex::new(factory),
                handler: Mutex::new(handler),
                hooks,
                next_worker_id: AtomicUsize::new(0),
            }),
        }
    }

    /// Submits `task` for execution.
    ///
    /// Three ordered attempts: start a core worker with `task` as its first
    /// task; enqueue and re-check pool state; start an excess worker. When
    /// all three fail the task goes to the rejection handler, whose result
    /// becomes the result of this call.
    pub fn execute(&self, task: Arc<T>) -> Result<(), RejectedExecutionError> {
        let inner = &self.inner;

        let mut c = inner.ctl.load();
        if c.worker_count() < inner.core_pool_size() {
            if Inner::add_worker(inner, Some(task.clone()), true) {
                return Ok(());
            }
            c = inner.ctl.load();
        }

        if c.is_running() && inner.queue.offer(task.clone()) {
            // Re-check after enqueuing: the pool may have been shut down
            // since entry, or the last worker may have died.
            let recheck = inner.ctl.load();
            if !recheck.is_running() && inner.queue.remove(&task) {
                return self.reject(task);
            } else if recheck.worker_count() == 0 {
                Inner::add_worker(inner, None, false);
            }
            return Ok(());
        }

        if !Inner::add_worker(inner, Some(task.clone()), false) {
            return self.reject(task);
        }
        Ok(())
    }

    fn reject(&self, task: Arc<T>) -> Result<(), RejectedExecutionError> {
        debug!(pool = %self.inner.name, "task rejected");
        let handler = self.inner.handler.lock().unwrap().clone();
        handler.rejected_execution(task, self)
    }

    /// Begins an orderly shutdown: previously submitted tasks still run,
    /// new submissions are rejected. No additional effect if already shut
    /// down.
    pub fn shutdown(&self) {
        let inner = &self.inner;
        let hook_panic;
        {
            let guard = inner.main.lock().unwrap();
            inner.ctl.advance_run_state(RunState::Shutdown);
            inner.interrupt_idle_workers_locked(&guard, false);
            hook_panic = panic::catch_unwind(AssertUnwindSafe(|| inner.hooks.run_on_shutdown()))
                .err();
        }
        debug!(pool = %inner.name, "shutdown requested");
        inner.try_terminate();
        if let Some(payload) = hook_panic {
            panic::resume_unwind(payload);
        }
    }

    /// Halts queued-task processing, interrupts every worker (busy or
    /// idle), and returns the tasks that never started.
    ///
    /// In-flight tasks observe the interrupt only cooperatively, through
    /// [`interrupt::requested`](petrel_api::interrupt::requested).
    pub fn shutdown_now(&self) -> Vec<Arc<T>> {
        let inner = &self.inner;
        let tasks;
        {
            let guard = inner.main.lock().unwrap();
            inner.ctl.advance_run_state(RunState::Stop);
            for slot in guard.workers.values() {
                slot.interrupt.raise();
            }
            tasks = inner.queue.drain();
        }
        debug!(pool = %inner.name, drained = tasks.len(), "immediate shutdown requested");
        inner.try_terminate();
        tasks
    }

    pub fn is_shutdown(&self) -> bool {
        !self.inner.ctl.load().is_running()
    }

    pub fn is_terminated(&self) -> bool {
        self.inner.ctl.load().at_least(RunState::Terminated)
    }

    /// True after shutdown has begun but before full termination.
    pub fn is_terminating(&self) -> bool {
        let c = self.inner.ctl.load();
        !c.is_running() && !c.at_least(RunState::Terminated)
    }

    /// Blocks until the pool terminates or `timeout` elapses; `true` means
    /// terminated.
    pub fn await_termination(&self, timeout: Duration) -> bool {
        let inner = &self.inner;
        let deadline = Instant::now().checked_add(timeout);
        let mut guard = inner.main.lock().unwrap();
        loop {
            if inner.ctl.load().at_least(RunState::Terminated) {
                return true;
            }
            match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    let (g, _) = inner
                        .termination
                        .wait_timeout(guard, deadline - now)
                        .unwrap();
                    guard = g;
                }
                // Timeout too large to represent; wait unbounded.
                None => guard = inner.termination.wait(guard).unwrap(),
            }
        }
    }

    /// Current number of live workers; 0 once the pool has begun tidying.
    pub fn pool_size(&self) -> usize {
        let inner = &self.inner;
        let guard = inner.main.lock().unwrap();
        if inner.ctl.load().at_least(RunState::Tidying) {
            0
        } else {
            guard.workers.len()
        }
    }

    /// Number of workers currently executing a task.
    pub fn active_count(&self) -> usize {
        let guard = self.inner.main.lock().unwrap();
        guard.workers.values().filter(|w| w.is_busy()).count()
    }

    /// High-water mark of the worker set.
    pub fn largest_pool_size(&self) -> usize {
        self.inner.main.lock().unwrap().largest_pool_size
    }

    /// Approximate total of tasks ever accepted: completed, running, and
    /// still queued.
    pub fn task_count(&self) -> u64 {
        let inner = &self.inner;
        let guard = inner.main.lock().unwrap();
        let mut n = guard.completed_tasks;
        for slot in guard.workers.values() {
            n += slot.completed();
            if slot.is_busy() {
                n += 1;
            }
        }
        n + inner.queue.len() as u64
    }

    /// Approximate total of tasks that have finished executing.
    pub fn completed_task_count(&self) -> u64 {
        let guard = self.inner.main.lock().unwrap();
        let mut n = guard.completed_tasks;
        for slot in guard.workers.values() {
            n += slot.completed();
        }
        n
    }

    pub fn core_pool_size(&self) -> usize {
        self.inner.core_pool_size()
    }

    /// Adjusts the core size. On a decrease below the live worker count,
    /// idle workers are interrupted so the excess can retire; on an
    /// increase, enough workers for the currently queued tasks are
    /// pre-started.
    pub fn set_core_pool_size(&self, size: usize) -> Result<(), ConfigError> {
        let inner = &self.inner;
        let maximum = inner.maximum_pool_size();
        if size > maximum {
            return Err(ConfigError::MaximumBelowCore {
                core: size,
                maximum,
            });
        }
        let old = inner.core_pool_size.swap(size, Ordering::SeqCst);
        if inner.ctl.load().worker_count() > size {
            inner.interrupt_idle_workers(false);
        } else if size > old {
            // We don't know how many new workers are actually needed; as a
            // heuristic, pre-start one per currently queued task, stopping
            // early if the queue empties meanwhile.
            let mut k = (size - old).min(inner.queue.len());
            while k > 0 && Inner::add_worker(inner, None, true) {
                k -= 1;
                if inner.queue.is_empty() {
                    break;
                }
            }
        }
        Ok(())
    }

    pub fn maximum_pool_size(&self) -> usize {
        self.inner.maximum_pool_size()
    }

    /// Adjusts the maximum size; must stay at or above the core size. On a
    /// decrease below the live worker count, idle workers are interrupted
    /// so the excess can retire.
    pub fn set_maximum_pool_size(&self, size: usize) -> Result<(), ConfigError> {
        let inner = &self.inner;
        if size == 0 {
            return Err(ConfigError::ZeroMaximumPoolSize);
        }
        let core = inner.core_pool_size();
        if size < core {
            return Err(ConfigError::MaximumBelowCore {
                core,
                maximum: size,
            });
        }
        inner.maximum_pool_size.store(size, Ordering::SeqCst);
        if inner.ctl.load().worker_count() > size {
            inner.interrupt_idle_workers(false);
        }
        Ok(())
    }

    pub fn keep_alive(&self) -> Duration {
        self.inner.keep_alive()
    }

    /// Adjusts the keep-alive time. A shorter value interrupts idle workers
    /// so the new timeout is observed promptly.
    pub fn set_keep_alive(&self, keep_alive: Duration) -> Result<(), ConfigError> {
        let inner = &self.inner;
        if keep_alive.is_zero() && inner.allow_core_thread_timeout() {
            return Err(ConfigError::ZeroKeepAlive);
        }
        let nanos = duration_to_nanos(keep_alive);
        let old = inner.keep_alive_nanos.swap(nanos, Ordering::SeqCst);
        if nanos < old {
            inner.interrupt_idle_workers(false);
        }
        Ok(())
    }

    pub fn allows_core_thread_timeout(&self) -> bool {
        self.inner.allow_core_thread_timeout()
    }

    /// Makes core workers subject to keep-alive eviction. Turning this on
    /// interrupts idle workers so the timeout takes effect immediately.
    pub fn set_allow_core_thread_timeout(&self, allow: bool) -> Result<(), ConfigError> {
        let inner = &self.inner;
        if allow && inner.keep_alive().is_zero() {
            return Err(ConfigError::ZeroKeepAlive);
        }
        let old = inner
            .allow_core_thread_timeout
            .swap(allow, Ordering::SeqCst);
        if allow && !old {
            inner.interrupt_idle_workers(false);
        }
        Ok(())
    }

    /// Starts one core worker idly waiting for work; `false` if the core
    /// pool is already fully started.
    pub fn prestart_core_thread(&self) -> bool {
        let inner = &self.inner;
        inner.ctl.load().worker_count() < inner.core_pool_size()
            && Inner::add_worker(inner, None, true)
    }

    /// Starts all core workers; returns how many were started.
    pub fn prestart_all_core_threads(&self) -> usize {
        let mut n = 0;
        while Inner::add_worker(&self.inner, None, true) {
            n += 1;
        }
        n
    }

    /// Removes a queued task by identity so it never runs. May miss tasks
    /// already handed to a worker.
    pub fn remove(&self, task: &Arc<T>) -> bool {
        let removed = self.inner.queue.remove(task);
        // The queue may now be empty during shutdown.
        self.inner.try_terminate();
        removed
    }

    /// Best-effort removal of cancelled tasks still sitting in the queue.
    /// Storage reclamation only, never required for correctness.
    pub fn purge(&self) {
        self.inner.queue.retain(&mut |task| !task.is_cancelled());
        self.inner.try_terminate();
    }

    /// The pool's work queue.
    pub fn queue(&self) -> &dyn WorkQueue<T> {
        self.inner.queue.as_ref()
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn thread_factory(&self) -> Arc<dyn ThreadFactory> {
        self.inner.factory.lock().unwrap().clone()
    }

    pub fn set_thread_factory(&self, factory: Arc<dyn ThreadFactory>) {
        *self.inner.factory.lock().unwrap() = factory;
    }

    pub fn rejection_handler(&self) -> Arc<dyn RejectionHandler<T>> {
        self.inner.handler.lock().unwrap().clone()
    }

    pub fn set_rejection_handler(&self, handler: Arc<dyn RejectionHandler<T>>) {
        *self.inner.handler.lock().unwrap() = handler;
    }
}

impl ThreadPool<Job> {
    /// Convenience wrapper submitting a closure as a one-shot [`Job`].
    pub fn spawn(&self, f: impl FnOnce() + Send + 'static) -> Result<(), RejectedExecutionError> {
        self.execute(Arc::new(Job::new(f)))
    }
}

impl<T: Task> fmt::Debug for ThreadPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = self.inner.ctl.load();
        f.debug_struct("ThreadPool")
            .field("name", &self.inner.name)
            .field("run_state", &c.run_state())
            .field("worker_count", &c.worker_count())
            .finish()
    }
}

impl<T: Task> Drop for ThreadPool<T> {
    fn drop(&mut self) {
        if self.inner.ctl.load().is_running() {
            warn!(
                pool = %self.inner.name,
                "pool dropped without shutdown; worker threads keep running"
            );
        }
    }
}

impl<T: Task> Inner<T> {
    fn core_pool_size(&self) -> usize {
        self.core_pool_size.load(Ordering::SeqCst)
    }

    fn maximum_pool_size(&self) -> usize {
        self.maximum_pool_size.load(Ordering::SeqCst)
    }

    fn keep_alive(&self) -> Duration {
        Duration::from_nanos(self.keep_alive_nanos.load(Ordering::SeqCst))
    }

    fn allow_core_thread_timeout(&self) -> bool {
        self.allow_core_thread_timeout.load(Ordering::SeqCst)
    }

    pub(crate) fn run_state(&self) -> RunState {
        self.ctl.load().run_state()
    }

    pub(crate) fn hooks(&self) -> &Hooks<T> {
        &self.hooks
    }

    /// Admits and starts one new worker if pool state and the applicable
    /// size bound allow it. `core` selects the core bound over the maximum.
    ///
    /// Returns `false` on saturation, on a pool past SHUTDOWN (except for
    /// the one allowed case: a replacement worker, with no first task,
    /// draining a still non-empty queue), and on thread-factory failure.
    pub(crate) fn add_worker(
        inner: &Arc<Inner<T>>,
        first_task: Option<Arc<T>>,
        core: bool,
    ) -> bool {
        loop {
            let mut c = inner.ctl.load();
            let rs = c.run_state();
            if rs >= RunState::Shutdown
                && !(rs == RunState::Shutdown && first_task.is_none() && !inner.queue.is_empty())
            {
                return false;
            }

            let mut retry = false;
            loop {
                let bound = if core {
                    inner.core_pool_size()
                } else {
                    inner.maximum_pool_size()
                };
                if c.worker_count() >= CAPACITY || c.worker_count() >= bound {
                    return false;
                }
                if inner.ctl.compare_and_increment(c) {
                    break;
                }
                c = inner.ctl.load();
                if c.run_state() != rs {
                    retry = true;
                    break;
                }
            }
            if !retry {
                break;
            }
        }

        // Count reserved. Build the slot, publish it under the pool lock,
        // then hand the run loop to the factory.
        let id = inner.next_worker_id.fetch_add(1, Ordering::Relaxed);
        let slot = Arc::new(WorkerSlot::new(id, first_task));

        let mut added = false;
        {
            let mut guard = inner.main.lock().unwrap();
            // The run state may have advanced while the slot was built.
            let rs = inner.ctl.load().run_state();
            if rs < RunState::Shutdown || (rs == RunState::Shutdown && !slot.has_first_task()) {
                guard.workers.insert(id, slot.clone());
                if guard.workers.len() > guard.largest_pool_size {
                    guard.largest_pool_size = guard.workers.len();
                }
                added = true;
            }
        }

        let mut started = false;
        if added {
            let factory = inner.factory.lock().unwrap().clone();
            let pool = Arc::clone(inner);
            let me = Arc::clone(&slot);
            match factory.new_thread(Box::new(move || worker::run(pool, me))) {
                Ok(_handle) => started = true,
                Err(e) => {
                    warn!(pool = %inner.name, error = %e, "thread factory failed to start a worker");
                }
            }
        }

        if !started {
            Inner::add_worker_failed(inner, id);
            return false;
        }

        debug!(pool = %inner.name, worker = id, core, "worker added");

        // A stop request may have raced with the thread start; deliver the
        // interrupt the new worker would otherwise have missed.
        if inner.ctl.load().at_least(RunState::Stop) {
            slot.interrupt.raise();
        }
        true
    }

    /// Rolls back a failed worker start: unpublishes the slot, releases the
    /// count reservation, and re-evaluates termination in case this worker
    /// was the last thing holding it up.
    fn add_worker_failed(inner: &Arc<Inner<T>>, id: usize) {
        {
            let mut guard = inner.main.lock().unwrap();
            guard.workers.remove(&id);
        }
        inner.ctl.decrement_worker_count();
        inner.try_terminate();
    }

    /// Blocking or timed wait for the next task, or `None` if this worker
    /// must exit: the pool is stopping, the pool is shut down with an empty
    /// queue, the worker is excess after a reconfiguration, or its
    /// keep-alive wait timed out while eviction applies. The `None` paths
    /// release this worker's count reservation.
    pub(crate) fn get_task(&self, slot: &WorkerSlot<T>) -> Option<Arc<T>> {
        let mut timed_out = false;
        'retry: loop {
            let mut c = self.ctl.load();
            let rs = c.run_state();
            if rs >= RunState::Shutdown && (rs >= RunState::Stop || self.queue.is_empty()) {
                self.ctl.decrement_worker_count();
                return None;
            }

            let timed = loop {
                let wc = c.worker_count();
                let timed = self.allow_core_thread_timeout() || wc > self.core_pool_size();
                if wc <= self.maximum_pool_size() && !(timed_out && timed) {
                    break timed;
                }
                if self.ctl.compare_and_decrement(c) {
                    return None;
                }
                c = self.ctl.load();
                if c.run_state() != rs {
                    continue 'retry;
                }
            };

            let outcome = if timed {
                self.queue.poll(self.keep_alive(), &slot.interrupt)
            } else {
                self.queue.take(&slot.interrupt).map(Some)
            };
            match outcome {
                Ok(Some(task)) => return Some(task),
                Ok(None) => timed_out = true,
                // Interruption is a state-recheck signal, never an exit
                // reason by itself.
                Err(_) => timed_out = false,
            }
        }
    }

    /// Bookkeeping for a dying worker: fold its statistics into the pool
    /// totals, re-evaluate termination, and replace the worker when queued
    /// work or the core size still needs it.
    pub(crate) fn process_worker_exit(
        inner: &Arc<Inner<T>>,
        slot: &WorkerSlot<T>,
        abrupt: bool,
    ) {
        if abrupt {
            // The normal exit path in get_task already released the count.
            inner.ctl.decrement_worker_count();
        }

        {
            let mut guard = inner.main.lock().unwrap();
            guard.completed_tasks += slot.completed();
            guard.workers.remove(&slot.id);
        }

        inner.try_terminate();

        let c = inner.ctl.load();
        if c.at_least(RunState::Stop) {
            return;
        }
        if !abrupt {
            let mut min = if inner.allow_core_thread_timeout() {
                0
            } else {
                inner.core_pool_size()
            };
            if min == 0 && !inner.queue.is_empty() {
                min = 1;
            }
            if c.worker_count() >= min {
                return;
            }
        }
        Inner::add_worker(inner, None, false);
    }

    /// Transitions to TERMINATED if eligible: SHUTDOWN with empty queue and
    /// no workers, or STOP with no workers. When eligible except for a
    /// nonzero worker count, interrupts one idle worker so the shutdown
    /// signal keeps propagating without an interrupt storm.
    ///
    /// Must be called after any action that might make termination
    /// possible: a worker exiting, a task removed from the queue during
    /// shutdown, a failed worker start.
    pub(crate) fn try_terminate(&self) {
        loop {
            let c = self.ctl.load();
            if c.is_running()
                || c.at_least(RunState::Tidying)
                || (c.run_state() == RunState::Shutdown && !self.queue.is_empty())
            {
                return;
            }
            if c.worker_count() != 0 {
                self.interrupt_idle_workers(true);
                return;
            }

            let guard = self.main.lock().unwrap();
            if self.ctl.compare_and_set(c, Ctl::of(RunState::Tidying, 0)) {
                let hook = panic::catch_unwind(AssertUnwindSafe(|| self.hooks.run_terminated()));
                self.ctl.store(Ctl::of(RunState::Terminated, 0));
                self.termination.notify_all();
                drop(guard);
                debug!(pool = %self.name, "pool terminated");
                if hook.is_err() {
                    error!(pool = %self.name, "terminated hook panicked");
                }
                return;
            }
            // Lost the CAS; re-read and retry.
            drop(guard);
        }
    }

    fn interrupt_idle_workers(&self, only_one: bool) {
        let guard = self.main.lock().unwrap();
        self.interrupt_idle_workers_locked(&guard, only_one);
    }

    /// Interrupts workers not currently executing a task so they re-check
    /// pool state or configuration. Serialized by the pool lock, which the
    /// caller holds.
    fn interrupt_idle_workers_locked(&self, guard: &PoolGuarded<T>, only_one: bool) {
        for slot in guard.workers.values() {
            if !slot.interrupt.is_raised() {
                slot.interrupt_if_idle();
            }
            if only_one {
                break;
            }
        }
    }
}

fn duration_to_nanos(d: Duration) -> u64 {
    d.as_nanos().min(u64::MAX as u128) as u64
}
