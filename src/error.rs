//! Error types for presence operations.

use thiserror::Error;

/// Errors surfaced by the backing key-value store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend cannot be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The backend accepted the connection but refuses writes
    /// (e.g. a read-only failover).
    #[error("store is read-only")]
    ReadOnly,

    /// Any other backend failure.
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Errors surfaced by the distributed lock.
#[derive(Debug, Error)]
pub enum LockError {
    /// The lock stayed contended past the bounded wait.
    #[error("timed out acquiring lock '{key}' after {waited_ms}ms")]
    Timeout { key: String, waited_ms: u64 },

    /// The store backing the lock failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors surfaced by the message bus.
#[derive(Debug, Error)]
pub enum BusError {
    /// The bus backend failed.
    #[error("bus backend error: {0}")]
    Backend(String),
}

/// Top-level error for channel operations.
#[derive(Debug, Error)]
pub enum PresenceError {
    /// No prefix resolver matched the name, or the resolver declined it.
    /// Distinct from a permission failure.
    #[error("no channel registered for '{0}'")]
    NotFound(String),

    /// A mutating operation was attempted without entry permission.
    /// Treated as a caller bug rather than a silent no-op, since ignoring
    /// it would mask a security defect upstream.
    #[error("operation not permitted on channel '{0}'")]
    Forbidden(String),

    /// The backing store failed mid-operation.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The channel lock could not be taken or released.
    #[error(transparent)]
    Lock(#[from] LockError),

    /// Publishing to the bus failed.
    #[error(transparent)]
    Bus(#[from] BusError),
}
