use std::any::Any;
use std::fmt;
use std::sync::Mutex;

/// Abstract unit of work executed by a pool worker.
///
/// Tasks are shared as `Arc<T>` between the submitter, the work queue, and
/// the executing worker, so `run` takes `&self`; implementations that need
/// by-value state use interior mutability (see [`Job`]).
pub trait Task: Send + Sync + 'static {
    /// Runs the task to completion on the calling thread.
    fn run(&self);

    /// Whether this task has been cancelled and will never run.
    ///
    /// Consulted only by the pool's best-effort `purge` sweep; the default
    /// is `false` for tasks with no cancellation notion.
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// One-shot adapter turning a closure into a [`Task`].
///
/// The closure is consumed on the first `run`; a second `run` (which a
/// correct pool never performs) is a no-op.
pub struct Job {
    body: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Job {
    pub fn new(f: impl FnOnce() + Send + 'static) -> Self {
        Self {
            body: Mutex::new(Some(Box::new(f))),
        }
    }
}

impl Task for Job {
    fn run(&self) {
        let body = self.body.lock().unwrap().take();
        if let Some(f) = body {
            f();
        }
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("spent", &self.body.lock().unwrap().is_none())
            .finish()
    }
}

/// Panic payload captured from a task body, handed to the `after_execute`
/// hook in place of the exception the original platform would deliver.
pub struct TaskPanic(Box<dyn Any + Send>);

impl TaskPanic {
    pub fn new(payload: Box<dyn Any + Send>) -> Self {
        Self(payload)
    }

    /// The panic message, when the payload is a string.
    pub fn message(&self) -> Option<&str> {
        if let Some(s) = self.0.downcast_ref::<String>() {
            Some(s)
        } else if let Some(s) = self.0.downcast_ref::<&'static str>() {
            Some(s)
        } else {
            None
        }
    }

    pub fn into_payload(self) -> Box<dyn Any + Send> {
        self.0
    }
}

impl fmt::Debug for TaskPanic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TaskPanic")
            .field(&self.message().unwrap_or("<non-string payload>"))
            .finish()
    }
}
