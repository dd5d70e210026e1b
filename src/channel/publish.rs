//! Payload shapes and topic mapping for channel events.
//!
//! Every channel publishes to exactly one topic derived from its name. The
//! payload shape follows the channel's policy: regular channels carry
//! identities (entering profiles or leaving ids), count-only channels carry
//! a signed delta and nothing else. Restricted channels additionally attach
//! delivery metadata so the bus, not this crate, enforces who receives the
//! message.

use super::PresenceChannel;
use crate::bus::PublishOptions;
use crate::error::PresenceError;
use crate::types::UserId;
use serde_json::{Value, json};
use std::collections::HashSet;

/// Prefix joining a channel name to its bus topic.
const TOPIC_PREFIX: &str = "/presence";

fn entering_payload(profiles: Vec<Value>) -> Value {
    json!({ "enteringUsers": profiles })
}

fn leaving_payload(user_ids: &[UserId]) -> Value {
    json!({ "leavingUserIds": user_ids })
}

fn count_delta_payload(delta: i64) -> Value {
    json!({ "countDelta": delta })
}

fn sorted_vec<T: Ord + Copy>(set: &HashSet<T>) -> Vec<T> {
    let mut ids: Vec<T> = set.iter().copied().collect();
    ids.sort_unstable();
    ids
}

impl PresenceChannel<'_> {
    /// The bus topic this channel publishes to (1:1 with the name).
    pub fn bus_topic_name(&self) -> String {
        format!("{}{}", TOPIC_PREFIX, self.name)
    }

    pub(super) async fn publish_entering(&self, user_ids: &[UserId]) -> Result<(), PresenceError> {
        let payload = if self.config.count_only {
            count_delta_payload(user_ids.len() as i64)
        } else {
            entering_payload(
                user_ids
                    .iter()
                    .map(|id| self.hub.profiles.entering_profile(*id))
                    .collect(),
            )
        };
        self.publish(payload).await
    }

    pub(super) async fn publish_leaving(&self, user_ids: &[UserId]) -> Result<(), PresenceError> {
        let payload = if self.config.count_only {
            count_delta_payload(-(user_ids.len() as i64))
        } else {
            leaving_payload(user_ids)
        };
        self.publish(payload).await
    }

    async fn publish(&self, payload: Value) -> Result<(), PresenceError> {
        let options = if self.config.public {
            PublishOptions::unrestricted()
        } else {
            PublishOptions {
                allowed_user_ids: self.config.allowed_user_ids.as_ref().map(sorted_vec),
                allowed_group_ids: self.config.allowed_group_ids.as_ref().map(sorted_vec),
            }
        };
        self.hub
            .bus
            .publish(&self.bus_topic_name(), payload, options)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_shapes() {
        assert_eq!(
            leaving_payload(&[UserId(3), UserId(7)]),
            json!({ "leavingUserIds": [3, 7] })
        );
        assert_eq!(count_delta_payload(-2), json!({ "countDelta": -2 }));
        assert_eq!(
            entering_payload(vec![json!({ "id": 1 })]),
            json!({ "enteringUsers": [{ "id": 1 }] })
        );
    }

    #[test]
    fn test_sorted_vec_is_deterministic() {
        let set: HashSet<UserId> = [UserId(9), UserId(2), UserId(5)].into_iter().collect();
        assert_eq!(sorted_vec(&set), vec![UserId(2), UserId(5), UserId(9)]);
    }
}
