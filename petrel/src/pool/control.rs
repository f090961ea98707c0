//! The packed run-state / worker-count control word.
//!
//! One atomic word is the single source of truth for "is the pool alive and
//! how many workers has it admitted". Packing both fields keeps them
//! consistent under concurrent updates: every change goes through a
//! compare-and-swap of the whole word.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Low bits of the control word holding the worker count.
const COUNT_BITS: u32 = usize::BITS - 3;

/// Maximum number of workers representable in the control word.
pub(crate) const CAPACITY: usize = (1 << COUNT_BITS) - 1;

const COUNT_MASK: usize = CAPACITY;

/// Coarse lifecycle phase of the pool.
///
/// Ordered; a pool's run state never decreases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum RunState {
    /// Accepting new tasks and processing queued ones.
    Running = 0,
    /// Not accepting new tasks; queued tasks still run.
    Shutdown = 1,
    /// Not accepting new tasks, not running queued tasks.
    Stop = 2,
    /// Workers and queue are empty; the termination hook is running.
    Tidying = 3,
    /// The termination hook has completed.
    Terminated = 4,
}

impl RunState {
    fn from_bits(bits: usize) -> RunState {
        match bits {
            0 => RunState::Running,
            1 => RunState::Shutdown,
            2 => RunState::Stop,
            3 => RunState::Tidying,
            _ => RunState::Terminated,
        }
    }
}

/// Decoded snapshot of the control word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Ctl(usize);

impl Ctl {
    pub(crate) fn of(state: RunState, count: usize) -> Ctl {
        debug_assert!(count <= CAPACITY);
        Ctl(((state as usize) << COUNT_BITS) | count)
    }

    pub(crate) fn run_state(self) -> RunState {
        RunState::from_bits(self.0 >> COUNT_BITS)
    }

    pub(crate) fn worker_count(self) -> usize {
        self.0 & COUNT_MASK
    }

    pub(crate) fn is_running(self) -> bool {
        self.run_state() == RunState::Running
    }

    pub(crate) fn at_least(self, state: RunState) -> bool {
        self.run_state() >= state
    }
}

/// The pool's control word. Updated only via compare-and-swap so the run
/// state and worker count always change together.
#[derive(Debug)]
pub(crate) struct ControlCell(AtomicUsize);

impl ControlCell {
    pub(crate) fn new() -> Self {
        ControlCell(AtomicUsize::new(Ctl::of(RunState::Running, 0).0))
    }

    pub(crate) fn load(&self) -> Ctl {
        Ctl(self.0.load(Ordering::SeqCst))
    }

    pub(crate) fn compare_and_set(&self, expected: Ctl, new: Ctl) -> bool {
        self.0
            .compare_exchange(expected.0, new.0, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Single CAS attempt to bump the worker count; callers retry with a
    /// fresh read on failure.
    pub(crate) fn compare_and_increment(&self, expected: Ctl) -> bool {
        self.compare_and_set(expected, Ctl(expected.0 + 1))
    }

    /// Single CAS attempt to drop the worker count by one.
    pub(crate) fn compare_and_decrement(&self, expected: Ctl) -> bool {
        self.compare_and_set(expected, Ctl(expected.0 - 1))
    }

    /// Unconditional decrement. Used only where the count was reserved but
    /// the normal release path cannot run (abrupt worker death, failed
    /// worker start).
    pub(crate) fn decrement_worker_count(&self) {
        loop {
            let c = self.load();
            if self.compare_and_decrement(c) {
                return;
            }
        }
    }

    /// Moves the run state forward to `target`, preserving the worker
    /// count. No-op if the state is already at or past `target`.
    ///
    /// Only `Shutdown` and `Stop` are valid targets; `Tidying` and
    /// `Terminated` are reached exclusively through the termination path.
    pub(crate) fn advance_run_state(&self, target: RunState) {
        debug_assert!(matches!(target, RunState::Shutdown | RunState::Stop));
        loop {
            let c = self.load();
            if c.at_least(target) || self.compare_and_set(c, Ctl::of(target, c.worker_count())) {
                return;
            }
        }
    }

    /// Plain store, used only for the TIDYING to TERMINATED transition
    /// while holding the pool lock.
    pub(crate) fn store(&self, value: Ctl) {
        self.0.store(value.0, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trips() {
        for state in [
            RunState::Running,
            RunState::Shutdown,
            RunState::Stop,
            RunState::Tidying,
            RunState::Terminated,
        ] {
            for count in [0, 1, 7, CAPACITY] {
                let c = Ctl::of(state, count);
                assert_eq!(c.run_state(), state);
                assert_eq!(c.worker_count(), count);
            }
        }
    }

    #[test]
    fn run_states_are_ordered() {
        assert!(RunState::Running < RunState::Shutdown);
        assert!(RunState::Shutdown < RunState::Stop);
        assert!(RunState::Stop < RunState::Tidying);
        assert!(RunState::Tidying < RunState::Terminated);
    }

    #[test]
    fn increment_preserves_state() {
        let cell = ControlCell::new();
        let c = cell.load();
        assert!(cell.compare_and_increment(c));
        let c = cell.load();
        assert_eq!(c.worker_count(), 1);
        assert_eq!(c.run_state(), RunState::Running);

        // A stale expected value must fail.
        assert!(!cell.compare_and_increment(Ctl::of(RunState::Running, 0)));
    }

    #[test]
    fn advance_never_goes_backwards() {
        let cell = ControlCell::new();
        let c = cell.load();
        assert!(cell.compare_and_increment(c));

        cell.advance_run_state(RunState::Stop);
        assert_eq!(cell.load().run_state(), RunState::Stop);
        assert_eq!(cell.load().worker_count(), 1);

        cell.advance_run_state(RunState::Shutdown);
        assert_eq!(cell.load().run_state(), RunState::Stop);
    }
}
