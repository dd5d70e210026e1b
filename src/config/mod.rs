//! Channel security configuration and prefix-based resolution.
//!
//! Feature modules register a resolver per channel-name prefix, typically
//! once at start-up. Resolution is a pure function of the registered table:
//! a name maps to the resolver whose prefix is a leading path segment of the
//! name, and the resolver either produces a [`ChannelConfig`] or declines
//! the name entirely ("no such channel").
//!
//! The registry is an explicit value threaded through
//! [`PresenceHub`](crate::hub::PresenceHub) rather than ambient global
//! state; [`ConfigRegistry::clear`] exists so test harnesses can reset it.

use crate::types::{GroupId, UserId};
use dashmap::DashMap;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// A function producing the security config for a concrete channel name,
/// or `None` when the channel does not exist under this prefix.
pub type ConfigResolver = Arc<dyn Fn(&str) -> Option<ChannelConfig> + Send + Sync>;

/// Per-channel security policy.
///
/// At most one of `public` / `allowed_user_ids` / `allowed_group_ids` is
/// meaningfully populated. With all three absent the channel grants no
/// access to anyone, staff included; that is still distinct from the
/// channel not existing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Anyone may view; any authenticated user may enter.
    pub public: bool,
    /// Explicit user allow-list.
    pub allowed_user_ids: Option<HashSet<UserId>>,
    /// Allow-list by group membership.
    pub allowed_group_ids: Option<HashSet<GroupId>>,
    /// Published events reveal only aggregate counts, never identities.
    pub count_only: bool,
}

impl ChannelConfig {
    /// A config granting no access.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether the channel is public.
    pub fn public(mut self, public: bool) -> Self {
        self.public = public;
        self
    }

    /// Sets the user allow-list.
    pub fn allowed_users(mut self, users: impl IntoIterator<Item = UserId>) -> Self {
        self.allowed_user_ids = Some(users.into_iter().collect());
        self
    }

    /// Sets the group allow-list.
    pub fn allowed_groups(mut self, groups: impl IntoIterator<Item = GroupId>) -> Self {
        self.allowed_group_ids = Some(groups.into_iter().collect());
        self
    }

    /// Sets whether published events are count-only.
    pub fn count_only(mut self, count_only: bool) -> Self {
        self.count_only = count_only;
        self
    }
}

/// Process-wide table mapping channel-name prefixes to config resolvers.
///
/// Cheap to clone; clones share the same table.
#[derive(Clone, Default)]
pub struct ConfigRegistry {
    prefixes: Arc<DashMap<String, ConfigResolver>>,
}

impl ConfigRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resolver for a prefix, replacing any previous one.
    pub fn register_prefix<F>(&self, prefix: impl Into<String>, resolver: F)
    where
        F: Fn(&str) -> Option<ChannelConfig> + Send + Sync + 'static,
    {
        self.prefixes.insert(prefix.into(), Arc::new(resolver));
    }

    /// Remove a prefix and its resolver.
    pub fn unregister_prefix(&self, prefix: &str) {
        self.prefixes.remove(prefix);
    }

    /// Resolve a channel name to its config.
    ///
    /// Returns `None` when no registered prefix matches or when the
    /// matching resolver declines the name. With nested prefixes the
    /// longest match wins.
    pub fn resolve(&self, channel_name: &str) -> Option<ChannelConfig> {
        let mut best: Option<(usize, ConfigResolver)> = None;
        for entry in self.prefixes.iter() {
            let prefix = entry.key();
            if !prefix_matches(prefix, channel_name) {
                continue;
            }
            if best.as_ref().is_none_or(|(len, _)| prefix.len() > *len) {
                best = Some((prefix.len(), entry.value().clone()));
            }
        }
        let (_, resolver) = best?;
        resolver(channel_name)
    }

    /// Remove every registered prefix. Reserved for test harnesses that
    /// need a clean slate between cases.
    pub fn clear(&self) {
        self.prefixes.clear();
    }
}

/// A prefix matches when it equals the name or is followed in the name by a
/// path separator: `/chat` matches `/chat/42` but not `/chatty/42`.
fn prefix_matches(prefix: &str, channel_name: &str) -> bool {
    channel_name == prefix
        || (channel_name.starts_with(prefix)
            && channel_name.as_bytes().get(prefix.len()) == Some(&b'/'))
}

impl fmt::Debug for ConfigRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut prefixes: Vec<String> = self.prefixes.iter().map(|e| e.key().clone()).collect();
        prefixes.sort();
        f.debug_struct("ConfigRegistry")
            .field("prefixes", &prefixes)
            .finish()
    }
}
