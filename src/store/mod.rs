//! TTL-capable key-value backend for presence state.
//!
//! The [`PresenceStore`] trait is the seam between channel logic and the
//! shared backend. It covers three concerns:
//!
//! - the per-channel entry table, keyed by `(user, client)` with a
//!   last-active timestamp and a channel-level TTL window
//! - the process-wide, non-expiring registry of channel names ever touched,
//!   which drives the fleet sweep
//! - the two atomic primitives ([`set_nx`](PresenceStore::set_nx) and
//!   [`del_if_eq`](PresenceStore::del_if_eq)) that the distributed lock is
//!   built on
//!
//! [`MemoryStore`] is the in-process implementation; a networked backend
//! (Redis-class) plugs in behind the same trait for multi-process fleets.

mod memory;

pub use memory::MemoryStore;

use crate::error::StoreError;
use crate::types::{ClientId, UserId};
use async_trait::async_trait;
use std::time::Duration;

/// One `(user, client)` presence record within a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceEntry {
    /// The user holding this entry.
    pub user_id: UserId,
    /// The client session the entry belongs to.
    pub client_id: ClientId,
    /// Unix seconds of the last `present` call for this pair.
    pub last_active_at: u64,
}

/// Shared, TTL-capable storage for presence channels.
///
/// All writes are atomic per entry. Implementations must tolerate concurrent
/// callers from many processes; the channel layer serializes its own
/// read-decide-write sequences with the distributed lock.
#[async_trait]
pub trait PresenceStore: Send + Sync {
    /// Upsert the `(user, client)` entry with its last-active timestamp and
    /// refresh the channel's storage TTL to `ttl` from now.
    async fn put_entry(
        &self,
        channel: &str,
        user_id: UserId,
        client_id: &ClientId,
        last_active_at: u64,
        ttl: Duration,
    ) -> Result<(), StoreError>;

    /// Remove one entry. Returns `true` if the entry existed.
    /// Removing an absent entry is a no-op, not an error.
    async fn remove_entry(
        &self,
        channel: &str,
        user_id: UserId,
        client_id: &ClientId,
    ) -> Result<bool, StoreError>;

    /// All entries of a channel, regardless of age.
    async fn entries(&self, channel: &str) -> Result<Vec<PresenceEntry>, StoreError>;

    /// Idempotently add a channel name to the persistent registry.
    async fn register_channel(&self, channel: &str) -> Result<(), StoreError>;

    /// Remove a channel name from the registry.
    async fn deregister_channel(&self, channel: &str) -> Result<(), StoreError>;

    /// Every channel name ever registered (may over-approximate live
    /// channels; order is unspecified).
    async fn registered_channels(&self) -> Result<Vec<String>, StoreError>;

    /// Set `key = token` only if the key is absent (or its previous holder
    /// expired), with a bounded validity. Returns `true` when the write won.
    async fn set_nx(&self, key: &str, token: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Delete `key` only if it still holds `token`.
    async fn del_if_eq(&self, key: &str, token: &str) -> Result<(), StoreError>;
}
