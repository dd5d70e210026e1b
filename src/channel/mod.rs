//! Presence channel core.
//!
//! A [`PresenceChannel`] is a stateless value recreated from its name on
//! every operation; durable state lives entirely in the store. Mutating
//! operations run their read-decide-write-publish sequence under the
//! channel's cross-process lock so that, for any interleaving of callers,
//! exactly one entering event is published when an absent user becomes
//! present and exactly one leaving event when a present user becomes
//! absent. Read-only
//! operations never take the lock and never mutate entries or TTLs.

mod publish;

use crate::config::ChannelConfig;
use crate::error::PresenceError;
use crate::hub::PresenceHub;
use crate::lock::DistributedLock;
use crate::types::{ClientId, UserId};
use rand::Rng;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Point-in-time membership snapshot, paired with the bus position a
/// joining client should resume consumption from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelState {
    /// Users with at least one live entry.
    pub user_ids: HashSet<UserId>,
    /// Always equal to `user_ids.len()`.
    pub count: usize,
    /// Last bus message id for this channel's topic at snapshot time.
    pub bus_last_id: u64,
}

/// A named, ephemeral scope with a security policy and a live membership
/// set.
pub struct PresenceChannel<'a> {
    hub: &'a PresenceHub,
    name: String,
    config: ChannelConfig,
}

impl<'a> PresenceChannel<'a> {
    pub(crate) fn new(hub: &'a PresenceHub, name: String, config: ChannelConfig) -> Self {
        Self { hub, name, config }
    }

    /// The channel name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The resolved security config.
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    // =========================================================================
    // Security evaluation
    // =========================================================================

    /// Whether the identity may enter (be counted present in) this channel.
    ///
    /// Presence requires a known identity, so anonymous callers are always
    /// denied. A config with no grants denies everyone.
    pub fn can_enter(&self, user_id: Option<UserId>) -> bool {
        let Some(user_id) = user_id else {
            return false;
        };
        if self.config.public {
            return true;
        }
        if let Some(allowed) = &self.config.allowed_user_ids
            && allowed.contains(&user_id)
        {
            return true;
        }
        if let Some(allowed) = self.config.allowed_groups_nonempty() {
            return !self.hub.groups.group_ids(user_id).is_disjoint(allowed);
        }
        false
    }

    /// Whether the identity may observe this channel.
    ///
    /// Anonymous observers may watch public channels but never join them;
    /// identified users view under the same rule as entry.
    pub fn can_view(&self, user_id: Option<UserId>) -> bool {
        match user_id {
            None => self.config.public,
            Some(user_id) => self.can_enter(Some(user_id)),
        }
    }

    // =========================================================================
    // Mutating operations
    // =========================================================================

    /// Record that `(user, client)` is present.
    ///
    /// Upserts the entry with the current timestamp and refreshes the
    /// channel's storage TTL. Publishes an entering event only when the user
    /// had no live entry beforehand; repeating the call for an
    /// already-present user publishes nothing.
    pub async fn present(
        &self,
        user_id: UserId,
        client_id: &ClientId,
    ) -> Result<(), PresenceError> {
        if !self.can_enter(Some(user_id)) {
            return Err(PresenceError::Forbidden(self.name.clone()));
        }
        let ttl = self.entry_ttl();
        self.lock()
            .with_lock(|| async move {
                let now = self.hub.clock.now_unix();
                let was_present = self.user_is_live(user_id, now).await?;
                self.hub
                    .store
                    .put_entry(&self.name, user_id, client_id, now, ttl)
                    .await?;
                self.hub.store.register_channel(&self.name).await?;
                if !was_present {
                    tracing::debug!(
                        channel = %self.name,
                        user = %user_id,
                        client = %client_id,
                        "user entered channel"
                    );
                    self.publish_entering(&[user_id]).await?;
                }
                Ok(())
            })
            .await
    }

    /// Remove the `(user, client)` entry.
    ///
    /// Removing an absent entry is a no-op. Publishes a leaving event only
    /// when the removed entry was the user's last; repeating the call for an
    /// already-absent user publishes nothing.
    pub async fn leave(&self, user_id: UserId, client_id: &ClientId) -> Result<(), PresenceError> {
        if !self.can_enter(Some(user_id)) {
            return Err(PresenceError::Forbidden(self.name.clone()));
        }
        self.lock()
            .with_lock(|| async move {
                let removed = self
                    .hub
                    .store
                    .remove_entry(&self.name, user_id, client_id)
                    .await?;
                if removed && !self.user_has_entries(user_id).await? {
                    tracing::debug!(
                        channel = %self.name,
                        user = %user_id,
                        client = %client_id,
                        "user left channel"
                    );
                    self.publish_leaving(&[user_id]).await?;
                }
                Ok(())
            })
            .await
    }

    /// Remove every entry older than the timeout.
    ///
    /// Users whose last remaining entry was removed are batched into a
    /// single leaving event for this sweep. Runs under the same lock
    /// discipline as [`leave`](Self::leave) and is safe to invoke
    /// redundantly.
    pub async fn auto_leave(&self) -> Result<(), PresenceError> {
        self.lock()
            .with_lock(|| async move {
                let now = self.hub.clock.now_unix();
                let timeout = self.hub.settings.timeout.as_secs();
                let entries = self.hub.store.entries(&self.name).await?;

                let mut remaining: HashMap<UserId, usize> = HashMap::new();
                for entry in &entries {
                    *remaining.entry(entry.user_id).or_insert(0) += 1;
                }

                let mut departed = Vec::new();
                for entry in &entries {
                    if now.saturating_sub(entry.last_active_at) < timeout {
                        continue;
                    }
                    let removed = self
                        .hub
                        .store
                        .remove_entry(&self.name, entry.user_id, &entry.client_id)
                        .await?;
                    if removed && let Some(count) = remaining.get_mut(&entry.user_id) {
                        *count -= 1;
                        if *count == 0 {
                            departed.push(entry.user_id);
                        }
                    }
                }

                if !departed.is_empty() {
                    departed.sort_unstable();
                    tracing::debug!(
                        channel = %self.name,
                        users = ?departed,
                        "expired entries swept"
                    );
                    self.publish_leaving(&departed).await?;
                }
                Ok(())
            })
            .await
    }

    // =========================================================================
    // Read-only operations (lock-free, eventually consistent)
    // =========================================================================

    /// Users with at least one entry younger than the timeout.
    pub async fn user_ids(&self) -> Result<HashSet<UserId>, PresenceError> {
        let now = self.hub.clock.now_unix();
        let timeout = self.hub.settings.timeout.as_secs();
        let entries = self.hub.store.entries(&self.name).await?;
        Ok(entries
            .into_iter()
            .filter(|entry| now.saturating_sub(entry.last_active_at) < timeout)
            .map(|entry| entry.user_id)
            .collect())
    }

    /// Number of present users.
    pub async fn count(&self) -> Result<usize, PresenceError> {
        Ok(self.user_ids().await?.len())
    }

    /// Snapshot membership together with the bus position.
    ///
    /// The last id is read before membership: a client resuming from it may
    /// see an event whose effect the snapshot already contains, but can
    /// never miss one. Event application must therefore be idempotent on
    /// the client side.
    pub async fn state(&self) -> Result<ChannelState, PresenceError> {
        let bus_last_id = self.hub.bus.last_id(&self.bus_topic_name()).await?;
        let user_ids = self.user_ids().await?;
        Ok(ChannelState {
            count: user_ids.len(),
            user_ids,
            bus_last_id,
        })
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn lock(&self) -> DistributedLock {
        DistributedLock::new(
            self.hub.store.clone(),
            format!("presence:lock:{}", self.name),
            self.hub.settings.lock_validity,
            self.hub.settings.lock_wait,
        )
    }

    /// TTL window for the channel's entry table: twice the timeout plus
    /// random slack, so channels refreshed in lockstep do not all expire in
    /// the same instant.
    fn entry_ttl(&self) -> Duration {
        let slack = self.hub.settings.ttl_slack.as_secs();
        let jitter = if slack == 0 {
            0
        } else {
            rand::rng().random_range(0..=slack)
        };
        self.hub.settings.timeout * 2 + Duration::from_secs(jitter)
    }

    /// Whether the user holds any entry younger than the timeout.
    async fn user_is_live(&self, user_id: UserId, now: u64) -> Result<bool, PresenceError> {
        let timeout = self.hub.settings.timeout.as_secs();
        let entries = self.hub.store.entries(&self.name).await?;
        Ok(entries.iter().any(|entry| {
            entry.user_id == user_id && now.saturating_sub(entry.last_active_at) < timeout
        }))
    }

    /// Whether the user holds any entry at all, regardless of age.
    async fn user_has_entries(&self, user_id: UserId) -> Result<bool, PresenceError> {
        let entries = self.hub.store.entries(&self.name).await?;
        Ok(entries.iter().any(|entry| entry.user_id == user_id))
    }
}

impl ChannelConfig {
    /// The group allow-list when it actually names groups. An empty list
    /// grants nothing and must not short-circuit evaluation.
    fn allowed_groups_nonempty(&self) -> Option<&HashSet<crate::types::GroupId>> {
        self.allowed_group_ids
            .as_ref()
            .filter(|groups| !groups.is_empty())
    }
}
