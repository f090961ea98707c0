use thiserror::Error;

/// Errors raised while validating pool configuration.
///
/// Construction and the dynamic setters fail fast with one of these; the
/// pool is never left partially configured.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("maximum pool size must be greater than zero")]
    ZeroMaximumPoolSize,
    #[error("maximum pool size {maximum} cannot be less than core pool size {core}")]
    MaximumBelowCore { core: usize, maximum: usize },
    #[error("core threads must have a nonzero keep-alive time")]
    ZeroKeepAlive,
}

/// Errors related to task admission.
///
/// Produced by the default abort policy when a submission can neither start
/// a worker nor be queued; other rejection policies may swallow the task
/// instead of surfacing this.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RejectedExecutionError {
    #[error("pool is saturated (workers and queue are both full)")]
    Saturated,
    #[error("pool is shutting down and no longer accepts tasks")]
    ShuttingDown,
}

/// Returned by a blocking queue wait when the waiting thread's interrupt
/// token was raised. The token's flag is consumed before this is returned,
/// so the caller re-checks pool state rather than exiting.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("blocking wait interrupted")]
pub struct Interrupted;
