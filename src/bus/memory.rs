//! In-process bus implementation.

use super::{MessageBus, PublishOptions};
use crate::error::BusError;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

/// One published message as retained by [`MemoryBus`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    /// Per-topic message id, starting at 1.
    pub id: u64,
    /// The JSON body delivered to clients.
    pub payload: Value,
    /// Out-of-band delivery restrictions.
    pub options: PublishOptions,
}

/// Concurrent in-process [`MessageBus`] that retains every message per
/// topic, preserving publish order.
///
/// Suitable for single-process deployments and for asserting on the wire
/// contract in tests.
#[derive(Debug, Default)]
pub struct MemoryBus {
    topics: DashMap<String, Vec<BusMessage>>,
}

impl MemoryBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// All messages published to a topic, in order.
    pub fn messages(&self, topic: &str) -> Vec<BusMessage> {
        self.topics
            .get(topic)
            .map(|log| log.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl MessageBus for MemoryBus {
    async fn publish(
        &self,
        topic: &str,
        payload: Value,
        options: PublishOptions,
    ) -> Result<u64, BusError> {
        let mut log = self.topics.entry(topic.to_string()).or_default();
        let id = log.last().map(|m| m.id).unwrap_or(0) + 1;
        log.push(BusMessage {
            id,
            payload,
            options,
        });
        Ok(id)
    }

    async fn last_id(&self, topic: &str) -> Result<u64, BusError> {
        Ok(self
            .topics
            .get(topic)
            .and_then(|log| log.last().map(|m| m.id))
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UserId;
    use serde_json::json;

    #[tokio::test]
    async fn test_ids_are_ordered_per_topic() {
        let bus = MemoryBus::new();

        let a1 = bus
            .publish("/a", json!({"n": 1}), PublishOptions::unrestricted())
            .await
            .unwrap();
        let b1 = bus
            .publish("/b", json!({"n": 1}), PublishOptions::unrestricted())
            .await
            .unwrap();
        let a2 = bus
            .publish("/a", json!({"n": 2}), PublishOptions::unrestricted())
            .await
            .unwrap();

        assert_eq!((a1, a2), (1, 2));
        assert_eq!(b1, 1);
        assert_eq!(bus.last_id("/a").await.unwrap(), 2);
        assert_eq!(bus.last_id("/b").await.unwrap(), 1);
        assert_eq!(bus.last_id("/c").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_restriction_metadata_is_out_of_band() {
        let bus = MemoryBus::new();
        let options = PublishOptions {
            allowed_user_ids: Some(vec![UserId(5)]),
            allowed_group_ids: None,
        };

        bus.publish("/a", json!({"countDelta": 1}), options.clone())
            .await
            .unwrap();

        let messages = bus.messages("/a");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].options, options);
        // The payload body carries no trace of the restriction.
        assert_eq!(messages[0].payload, json!({"countDelta": 1}));
    }
}
