//! Default worker-thread factory.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

use petrel_api::factory::ThreadFactory;

/// Spawns worker threads named `"{prefix}-worker-{n}"`.
#[derive(Debug)]
pub struct PoolThreadFactory {
    prefix: String,
    next_id: AtomicUsize,
}

impl PoolThreadFactory {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            next_id: AtomicUsize::new(0),
        }
    }
}

impl ThreadFactory for PoolThreadFactory {
    fn new_thread(&self, body: Box<dyn FnOnce() + Send>) -> io::Result<JoinHandle<()>> {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        thread::Builder::new()
            .name(format!("{}-worker-{}", self.prefix, n))
            .spawn(body)
    }
}
