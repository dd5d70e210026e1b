//! Publish/subscribe transport seam.
//!
//! The channel layer only needs two things from its bus: ordered publishes
//! per topic and a retrievable last id, so a joining client can take a
//! [`state`](crate::channel::PresenceChannel::state) snapshot and resume
//! consumption without gaps. Delivery itself (including enforcement of the
//! restriction metadata) is the bus's responsibility, not this crate's.

mod memory;

pub use memory::{BusMessage, MemoryBus};

use crate::error::BusError;
use crate::types::{GroupId, UserId};
use async_trait::async_trait;
use serde_json::Value;

/// Delivery-restriction metadata attached to a publish call.
///
/// For non-public channels this names who may receive the message. It is
/// carried out-of-band and never appears in the JSON body delivered to
/// clients.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishOptions {
    /// Restrict delivery to these users.
    pub allowed_user_ids: Option<Vec<UserId>>,
    /// Restrict delivery to members of these groups.
    pub allowed_group_ids: Option<Vec<GroupId>>,
}

impl PublishOptions {
    /// No restrictions; anyone subscribed may receive the message.
    pub fn unrestricted() -> Self {
        Self::default()
    }
}

/// A publish/subscribe transport with per-topic ordered delivery.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish a payload to a topic. Returns the id assigned to the
    /// message; ids are strictly increasing within a topic.
    async fn publish(
        &self,
        topic: &str,
        payload: Value,
        options: PublishOptions,
    ) -> Result<u64, BusError>;

    /// The id of the most recent message on a topic, or 0 if none.
    async fn last_id(&self, topic: &str) -> Result<u64, BusError>;
}
