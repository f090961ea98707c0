//! # Petrel Executor API
//!
//! Petrel is a lifecycle-managed thread-pool task executor. This crate is the
//! abstract interface layer: the contracts the executor core consumes and the
//! error taxonomy it surfaces, kept free of any scheduling policy so that
//! alternative queue, factory, and task implementations can be supplied
//! without touching the core.
//!
//! ## Design Principles
//!
//! - **Minimal contracts**: the core needs only a blocking-queue contract, a
//!   thread-factory contract, and a unit-of-work contract. Everything else is
//!   implementation detail of the `petrel` crate.
//! - **Explicit interruption**: there is no ambient thread interruption on
//!   this platform, so blocking waits take an [`interrupt::Interrupt`] token
//!   and report [`errors::Interrupted`] when it is raised.
//! - **Typed failures**: admission rejection and configuration mistakes each
//!   have their own error type; internal races are never user-visible.
//!
//! ## Module Organization
//!
//! - [`task`]: the unit-of-work contract and the one-shot closure adapter
//! - [`queue`]: the blocking work-queue contract
//! - [`factory`]: the worker-thread factory contract
//! - [`interrupt`]: the interruption token used to wake blocked workers
//! - [`errors`]: error types shared by the contracts and the core

pub mod errors;
pub mod factory;
pub mod interrupt;
pub mod queue;
pub mod task;

pub use errors::{ConfigError, Interrupted, RejectedExecutionError};
pub use factory::ThreadFactory;
pub use interrupt::Interrupt;
pub use queue::WorkQueue;
pub use task::{Job, Task, TaskPanic};
