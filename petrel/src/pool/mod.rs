//! The thread-pool executor core.
//!
//! ## Key Concepts
//! - Control word: one atomic integer packing the run state and worker count
//! - Admission: start a worker, enqueue, or reject each submitted task
//! - Worker loop: fetch-and-run until the pool state says retire
//! - Shutdown sequencing: orderly or immediate, ending in termination
//!
//! ## Design Principles
//! - Lock-free lifecycle state, one coarse lock for the worker set
//! - Internal races resolved by CAS retry, never surfaced as errors
//! - Collaborators (queue, factory, rejection, hooks) injected as trait
//!   objects and closures

pub mod config;
mod control;
pub mod executor;
pub mod factory;
pub mod reject;
mod worker;

pub use config::{PoolConfig, ThreadPoolBuilder};
pub use executor::ThreadPool;
pub use factory::PoolThreadFactory;
pub use reject::{
    AbortPolicy, CallerRunsPolicy, DiscardOldestPolicy, DiscardPolicy, RejectionHandler,
};
