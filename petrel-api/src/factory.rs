use std::io;
use std::thread::JoinHandle;

/// Factory for the pool's worker threads.
///
/// Spawning starts the thread immediately; `Err` is the resource-exhaustion
/// signal the pool must absorb by backing out the worker it was about to
/// create, never by crashing or surfacing the error from a submission.
pub trait ThreadFactory: Send + Sync {
    fn new_thread(&self, body: Box<dyn FnOnce() + Send>) -> io::Result<JoinHandle<()>>;
}
