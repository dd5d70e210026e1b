//! In-process store implementation.

use super::{PresenceEntry, PresenceStore};
use crate::clock::{Clock, SystemClock};
use crate::error::StoreError;
use crate::types::{ClientId, UserId};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Per-channel entry table plus its expiry deadline.
#[derive(Default)]
struct ChannelTable {
    entries: HashMap<(UserId, ClientId), u64>,
    expires_at: u64,
}

/// A lock cell: the fencing token and when it stops being valid.
struct LockCell {
    token: String,
    expires_at: u64,
}

/// Concurrent in-process [`PresenceStore`].
///
/// Fully usable for single-process deployments; in tests it pairs with a
/// [`ManualClock`](crate::clock::ManualClock) so TTL behavior is
/// deterministic. The `set_read_only` switch models a backend that fails
/// over into a write-rejecting state.
pub struct MemoryStore {
    channels: DashMap<String, ChannelTable>,
    registry: DashSet<String>,
    locks: DashMap<String, LockCell>,
    clock: Arc<dyn Clock>,
    read_only: AtomicBool,
}

impl MemoryStore {
    /// Create a store on the wall clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a store on an explicit clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            channels: DashMap::new(),
            registry: DashSet::new(),
            locks: DashMap::new(),
            clock,
            read_only: AtomicBool::new(false),
        }
    }

    /// Reject all writes until switched back, like a read-only failover.
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(StoreError::ReadOnly);
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PresenceStore for MemoryStore {
    async fn put_entry(
        &self,
        channel: &str,
        user_id: UserId,
        client_id: &ClientId,
        last_active_at: u64,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        self.check_writable()?;
        let now = self.clock.now_unix();
        let mut table = self.channels.entry(channel.to_string()).or_default();
        if table.expires_at != 0 && table.expires_at <= now {
            table.entries.clear();
        }
        table
            .entries
            .insert((user_id, client_id.clone()), last_active_at);
        table.expires_at = now.saturating_add(ttl.as_secs());
        Ok(())
    }

    async fn remove_entry(
        &self,
        channel: &str,
        user_id: UserId,
        client_id: &ClientId,
    ) -> Result<bool, StoreError> {
        self.check_writable()?;
        let now = self.clock.now_unix();
        let Some(mut table) = self.channels.get_mut(channel) else {
            return Ok(false);
        };
        if table.expires_at != 0 && table.expires_at <= now {
            table.entries.clear();
            return Ok(false);
        }
        Ok(table
            .entries
            .remove(&(user_id, client_id.clone()))
            .is_some())
    }

    async fn entries(&self, channel: &str) -> Result<Vec<PresenceEntry>, StoreError> {
        let now = self.clock.now_unix();
        let Some(table) = self.channels.get(channel) else {
            return Ok(Vec::new());
        };
        if table.expires_at != 0 && table.expires_at <= now {
            return Ok(Vec::new());
        }
        Ok(table
            .entries
            .iter()
            .map(|((user_id, client_id), last_active_at)| PresenceEntry {
                user_id: *user_id,
                client_id: client_id.clone(),
                last_active_at: *last_active_at,
            })
            .collect())
    }

    async fn register_channel(&self, channel: &str) -> Result<(), StoreError> {
        self.check_writable()?;
        self.registry.insert(channel.to_string());
        Ok(())
    }

    async fn deregister_channel(&self, channel: &str) -> Result<(), StoreError> {
        self.check_writable()?;
        self.registry.remove(channel);
        Ok(())
    }

    async fn registered_channels(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.registry.iter().map(|name| name.clone()).collect())
    }

    async fn set_nx(&self, key: &str, token: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.check_writable()?;
        let now = self.clock.now_unix();
        let cell = LockCell {
            token: token.to_string(),
            expires_at: now.saturating_add(ttl.as_secs()),
        };
        match self.locks.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                // A holder past its validity window is treated as crashed.
                if occupied.get().expires_at <= now {
                    occupied.insert(cell);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(cell);
                Ok(true)
            }
        }
    }

    async fn del_if_eq(&self, key: &str, token: &str) -> Result<(), StoreError> {
        self.check_writable()?;
        self.locks.remove_if(key, |_, cell| cell.token == token);
        Ok(())
    }
}
