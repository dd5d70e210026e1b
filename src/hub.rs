//! The dependency-injection boundary for presence channels.
//!
//! A [`PresenceHub`] bundles the config registry with the store, bus, and
//! the external collaborator seams (group membership, profile formatting,
//! time). It is constructed once at start-up and threaded through to
//! whatever surface exposes channel operations. Channels themselves are
//! stateless values recreated from their name on every operation; all
//! durable state lives behind the store.

use crate::bus::MessageBus;
use crate::channel::PresenceChannel;
use crate::clock::{Clock, SystemClock};
use crate::config::ConfigRegistry;
use crate::error::PresenceError;
use crate::store::PresenceStore;
use crate::types::{GroupId, UserId};
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Resolves which groups a user belongs to.
///
/// The authority behind this lives outside the crate (typically a database
/// or directory service); implementations are expected to cache as needed.
pub trait GroupResolver: Send + Sync {
    /// The ids of every group the user is a member of.
    fn group_ids(&self, user_id: UserId) -> HashSet<GroupId>;
}

/// A [`GroupResolver`] under which nobody belongs to any group.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGroups;

impl GroupResolver for NoGroups {
    fn group_ids(&self, _user_id: UserId) -> HashSet<GroupId> {
        HashSet::new()
    }
}

/// Produces the minimal profile object attached to entering payloads.
///
/// The object must contain an `"id"` field; what else it carries (and how
/// fields are formatted) is decided outside this crate. Count-only channels
/// never consult this source.
pub trait ProfileSource: Send + Sync {
    /// The profile published for a user entering a channel.
    fn entering_profile(&self, user_id: UserId) -> Value {
        json!({ "id": user_id })
    }
}

/// A [`ProfileSource`] publishing nothing beyond the user id.
#[derive(Debug, Clone, Copy, Default)]
pub struct MinimalProfiles;

impl ProfileSource for MinimalProfiles {}

/// Tunable timings for presence tracking.
#[derive(Debug, Clone)]
pub struct PresenceSettings {
    /// How long an unrefreshed entry counts as present. The fleet sweep
    /// should run at roughly half this period.
    pub timeout: Duration,
    /// How long one lock acquisition may exclude other processes.
    pub lock_validity: Duration,
    /// How long lock acquisition blocks on a competing holder.
    pub lock_wait: Duration,
    /// Upper bound of the random slack added to the channel TTL window, so
    /// many channels refreshed together do not all expire together.
    pub ttl_slack: Duration,
}

impl Default for PresenceSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            lock_validity: Duration::from_secs(5),
            lock_wait: Duration::from_secs(2),
            ttl_slack: Duration::from_secs(180),
        }
    }
}

/// Shared context for all presence channels of a deployment.
pub struct PresenceHub {
    pub(crate) registry: ConfigRegistry,
    pub(crate) store: Arc<dyn PresenceStore>,
    pub(crate) bus: Arc<dyn MessageBus>,
    pub(crate) groups: Arc<dyn GroupResolver>,
    pub(crate) profiles: Arc<dyn ProfileSource>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) settings: PresenceSettings,
}

impl PresenceHub {
    /// Create a hub over the given registry, store, and bus.
    ///
    /// Group membership defaults to [`NoGroups`], profiles to
    /// [`MinimalProfiles`], time to the wall clock.
    pub fn new(
        registry: ConfigRegistry,
        store: Arc<dyn PresenceStore>,
        bus: Arc<dyn MessageBus>,
    ) -> Self {
        Self {
            registry,
            store,
            bus,
            groups: Arc::new(NoGroups),
            profiles: Arc::new(MinimalProfiles),
            clock: Arc::new(SystemClock),
            settings: PresenceSettings::default(),
        }
    }

    /// Sets the group membership resolver.
    pub fn groups(mut self, groups: Arc<dyn GroupResolver>) -> Self {
        self.groups = groups;
        self
    }

    /// Sets the profile source for entering payloads.
    pub fn profiles(mut self, profiles: Arc<dyn ProfileSource>) -> Self {
        self.profiles = profiles;
        self
    }

    /// Sets the time source.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the presence timings.
    pub fn settings(mut self, settings: PresenceSettings) -> Self {
        self.settings = settings;
        self
    }

    /// The config registry this hub resolves channels against.
    pub fn registry(&self) -> &ConfigRegistry {
        &self.registry
    }

    /// Materialize the channel with the given name.
    ///
    /// Fails with [`PresenceError::NotFound`] when no config resolves for
    /// the name.
    pub fn channel(&self, name: &str) -> Result<PresenceChannel<'_>, PresenceError> {
        let config = self
            .registry
            .resolve(name)
            .ok_or_else(|| PresenceError::NotFound(name.to_string()))?;
        Ok(PresenceChannel::new(self, name.to_string(), config))
    }
}
