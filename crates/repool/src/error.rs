//! Error types for the async pooling surface.
//!
//! The synchronous rent/return hot path is infallible by contract: capacity
//! exhaustion degrades to direct allocation or silent discard, never to an
//! error. Only the large-object and maintenance operations return `Result`.

/// Error type for large-object and maintenance operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// The operation observed a cancellation request.
    #[error("operation cancelled")]
    Cancelled,

    /// The pool has begun teardown and no longer accepts async work.
    #[error("pool is shutting down")]
    ShuttingDown,
}

/// Result alias for the async pooling surface.
pub type PoolResult<T> = Result<T, PoolError>;
