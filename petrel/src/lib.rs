//! # Petrel
//!
//! A lifecycle-managed, dynamically sized thread-pool task executor.
//!
//! A [`ThreadPool`] keeps between `core_pool_size` and `maximum_pool_size`
//! worker threads pulling tasks from a caller-supplied [`WorkQueue`]. The
//! pool moves through a monotonic lifecycle (running, shutdown, stop,
//! tidying, terminated) and guarantees that an accepted task is never lost,
//! never run twice, and never stranded in the queue with no worker left to
//! pick it up.
//!
//! ```no_run
//! use std::time::Duration;
//! use petrel::{LinkedWorkQueue, PoolConfig, ThreadPool};
//!
//! let pool = ThreadPool::new(
//!     PoolConfig {
//!         core_pool_size: 2,
//!         maximum_pool_size: 4,
//!         keep_alive: Duration::from_secs(30),
//!         allow_core_thread_timeout: false,
//!     },
//!     Box::new(LinkedWorkQueue::new()),
//! )
//! .unwrap();
//!
//! pool.spawn(|| println!("hello from a worker")).unwrap();
//!
//! pool.shutdown();
//! assert!(pool.await_termination(Duration::from_secs(5)));
//! ```

pub mod logging;
pub mod pool;
pub mod queue;

// Re-export the interface layer so downstream users need only this crate.
pub use petrel_api::errors::{ConfigError, Interrupted, RejectedExecutionError};
pub use petrel_api::factory::ThreadFactory;
pub use petrel_api::interrupt;
pub use petrel_api::queue::WorkQueue;
pub use petrel_api::task::{Job, Task, TaskPanic};

pub use pool::config::{PoolConfig, ThreadPoolBuilder};
pub use pool::executor::ThreadPool;
pub use pool::factory::PoolThreadFactory;
pub use pool::reject::{
    AbortPolicy, CallerRunsPolicy, DiscardOldestPolicy, DiscardPolicy, RejectionHandler,
};
pub use queue::{ArrayWorkQueue, LinkedWorkQueue, SyncHandoffQueue};
