//! Concrete blocking work queues.
//!
//! Each implements the [`WorkQueue`](petrel_api::queue::WorkQueue) contract
//! with a different insertion policy: unbounded buffering, bounded
//! buffering, or direct hand-off. Blocking consumers register their
//! interrupt token's wake target with the queue before waiting, so a raise
//! is serialized with the queue's own lock and can never be lost.

mod array;
mod linked;
mod sync;

pub use array::ArrayWorkQueue;
pub use linked::LinkedWorkQueue;
pub use sync::SyncHandoffQueue;
