//! Pool configuration and construction.

use std::fmt;
use std::sync::Arc;
use std::thread::Thread;
use std::time::Duration;

use petrel_api::errors::ConfigError;
use petrel_api::factory::ThreadFactory;
use petrel_api::queue::WorkQueue;
use petrel_api::task::{Task, TaskPanic};

use super::executor::ThreadPool;
use super::factory::PoolThreadFactory;
use super::reject::{AbortPolicy, RejectionHandler};

/// Sizing and keep-alive settings for a [`ThreadPool`].
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of workers kept alive even when idle, unless
    /// `allow_core_thread_timeout` is set.
    pub core_pool_size: usize,

    /// Upper bound on concurrently live workers.
    pub maximum_pool_size: usize,

    /// How long an excess idle worker waits for work before retiring.
    pub keep_alive: Duration,

    /// Whether core workers are also subject to keep-alive eviction.
    pub allow_core_thread_timeout: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        let cpus = num_cpus::get();
        Self {
            core_pool_size: cpus,
            maximum_pool_size: cpus * 2,
            keep_alive: Duration::from_secs(60),
            allow_core_thread_timeout: false,
        }
    }
}

impl PoolConfig {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.maximum_pool_size == 0 {
            return Err(ConfigError::ZeroMaximumPoolSize);
        }
        if self.maximum_pool_size < self.core_pool_size {
            return Err(ConfigError::MaximumBelowCore {
                core: self.core_pool_size,
                maximum: self.maximum_pool_size,
            });
        }
        if self.allow_core_thread_timeout && self.keep_alive.is_zero() {
            return Err(ConfigError::ZeroKeepAlive);
        }
        Ok(())
    }
}

type BeforeExecute<T> = Box<dyn Fn(&Thread, &T) + Send + Sync>;
type AfterExecute<T> = Box<dyn Fn(&T, Option<&TaskPanic>) + Send + Sync>;
type PlainHook = Box<dyn Fn() + Send + Sync>;

/// Lifecycle hooks, injected at construction. All default to no-ops.
pub(crate) struct Hooks<T: Task> {
    pub(crate) before_execute: Option<BeforeExecute<T>>,
    pub(crate) after_execute: Option<AfterExecute<T>>,
    pub(crate) on_shutdown: Option<PlainHook>,
    pub(crate) terminated: Option<PlainHook>,
}

impl<T: Task> Default for Hooks<T> {
    fn default() -> Self {
        Self {
            before_execute: None,
            after_execute: None,
            on_shutdown: None,
            terminated: None,
        }
    }
}

impl<T: Task> Hooks<T> {
    pub(crate) fn run_before(&self, thread: &Thread, task: &T) {
        if let Some(hook) = &self.before_execute {
            hook(thread, task);
        }
    }

    pub(crate) fn run_after(&self, task: &T, panic: Option<&TaskPanic>) {
        if let Some(hook) = &self.after_execute {
            hook(task, panic);
        }
    }

    pub(crate) fn run_on_shutdown(&self) {
        if let Some(hook) = &self.on_shutdown {
            hook();
        }
    }

    pub(crate) fn run_terminated(&self) {
        if let Some(hook) = &self.terminated {
            hook();
        }
    }
}

/// Builder assembling a [`ThreadPool`] from its collaborators.
///
/// `build` validates the configuration and never yields a partially
/// configured pool.
pub struct ThreadPoolBuilder<T: Task> {
    config: PoolConfig,
    name: String,
    factory: Option<Arc<dyn ThreadFactory>>,
    handler: Arc<dyn RejectionHandler<T>>,
    hooks: Hooks<T>,
}

impl<T: Task> ThreadPoolBuilder<T> {
    pub fn new() -> Self {
        Self {
            config: PoolConfig::default(),
            name: "petrel".to_string(),
            factory: None,
            handler: Arc::new(AbortPolicy),
            hooks: Hooks::default(),
        }
    }

    /// Pool name, used for worker thread names and log records.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn config(mut self, config: PoolConfig) -> Self {
        self.config = config;
        self
    }

    pub fn core_pool_size(mut self, size: usize) -> Self {
        self.config.core_pool_size = size;
        self
    }

    pub fn maximum_pool_size(mut self, size: usize) -> Self {
        self.config.maximum_pool_size = size;
        self
    }

    pub fn keep_alive(mut self, keep_alive: Duration) -> Self {
        self.config.keep_alive = keep_alive;
        self
    }

    pub fn allow_core_thread_timeout(mut self, allow: bool) -> Self {
        self.config.allow_core_thread_timeout = allow;
        self
    }

    pub fn thread_factory(mut self, factory: Arc<dyn ThreadFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn rejection_handler(mut self, handler: Arc<dyn RejectionHandler<T>>) -> Self {
        self.handler = handler;
        self
    }

    /// Hook invoked by the worker thread right before each task runs.
    pub fn before_execute(mut self, hook: impl Fn(&Thread, &T) + Send + Sync + 'static) -> Self {
        self.hooks.before_execute = Some(Box::new(hook));
        self
    }

    /// Hook invoked after each task, with the captured panic if the task
    /// failed.
    pub fn after_execute(
        mut self,
        hook: impl Fn(&T, Option<&TaskPanic>) + Send + Sync + 'static,
    ) -> Self {
        self.hooks.after_execute = Some(Box::new(hook));
        self
    }

    /// Hook invoked once when an orderly shutdown begins.
    pub fn on_shutdown(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.hooks.on_shutdown = Some(Box::new(hook));
        self
    }

    /// Hook invoked once when the pool has fully terminated.
    pub fn terminated(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.hooks.terminated = Some(Box::new(hook));
        self
    }

    /// Validates the configuration and builds the pool around `queue`.
    pub fn build(self, queue: Box<dyn WorkQueue<T>>) -> Result<ThreadPool<T>, ConfigError> {
        self.config.validate()?;
        let factory = self
            .factory
            .unwrap_or_else(|| Arc::new(PoolThreadFactory::new(&self.name)));
        Ok(ThreadPool::from_parts(
            self.name,
            self.config,
            queue,
            factory,
            self.handler,
            self.hooks,
        ))
    }
}

impl<T: Task> Default for ThreadPoolBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Task> fmt::Debug for ThreadPoolBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPoolBuilder")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(PoolConfig::default().validate(), Ok(()));
    }

    #[test]
    fn zero_maximum_is_rejected() {
        let config = PoolConfig {
            core_pool_size: 0,
            maximum_pool_size: 0,
            ..PoolConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroMaximumPoolSize));
    }

    #[test]
    fn maximum_below_core_is_rejected() {
        let config = PoolConfig {
            core_pool_size: 4,
            maximum_pool_size: 2,
            ..PoolConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::MaximumBelowCore {
                core: 4,
                maximum: 2
            })
        );
    }

    #[test]
    fn zero_keep_alive_needs_pinned_core_threads() {
        let config = PoolConfig {
            keep_alive: Duration::ZERO,
            allow_core_thread_timeout: true,
            ..PoolConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroKeepAlive));

        let config = PoolConfig {
            keep_alive: Duration::ZERO,
            allow_core_thread_timeout: false,
            ..PoolConfig::default()
        };
        assert_eq!(config.validate(), Ok(()));
    }
}
