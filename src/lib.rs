//! # Copresence - Distributed Presence Channels
//!
//! Copresence tracks, across many stateless application processes, which
//! identities are currently "present" in a named, ephemeral scope (viewing
//! a page, editing a document) and propagates join/leave transitions to
//! subscribers with at most one notification per transition.
//!
//! # Overview
//!
//! - **Channels**: named scopes with per-channel security policies,
//!   resolved by prefix from a [`ConfigRegistry`]
//! - **Entries**: `(user, client)` pairs with TTL-refreshed timestamps, so
//!   one user can be present from several tabs or devices at once
//! - **Deduplicated fan-out**: a cross-process lock serializes each
//!   channel's read-decide-write-publish sequence, so concurrent writers
//!   never double-publish an enter or leave
//! - **Fleet sweep**: a periodic, redundancy-safe pass expires abandoned
//!   entries and batches the resulting leaves
//!
//! Durable state lives behind the [`PresenceStore`] seam and events flow
//! through the [`MessageBus`] seam; the bundled [`MemoryStore`] and
//! [`MemoryBus`] serve single-process deployments and tests.
//!
//! # Quick Start
//!
//! ```ignore
//! use copresence::{ChannelConfig, ConfigRegistry, MemoryBus, MemoryStore, PresenceHub, UserId};
//! use std::sync::Arc;
//!
//! let registry = ConfigRegistry::new();
//! registry.register_prefix("/chat", |_| Some(ChannelConfig::new().public(true)));
//!
//! let hub = PresenceHub::new(
//!     registry,
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(MemoryBus::new()),
//! );
//!
//! let channel = hub.channel("/chat/42")?;
//! channel.present(UserId(1), &"tab-1".into()).await?;
//! assert_eq!(channel.count().await?, 1);
//! ```

pub mod bus;
pub mod channel;
pub mod clock;
pub mod config;
pub mod error;
pub mod hub;
pub mod lock;
pub mod store;
pub mod sweep;
pub mod types;

pub use bus::{BusMessage, MemoryBus, MessageBus, PublishOptions};
pub use channel::{ChannelState, PresenceChannel};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ChannelConfig, ConfigRegistry, ConfigResolver};
pub use error::{BusError, LockError, PresenceError, StoreError};
pub use hub::{
    GroupResolver, MinimalProfiles, NoGroups, PresenceHub, PresenceSettings, ProfileSource,
};
pub use lock::DistributedLock;
pub use store::{MemoryStore, PresenceEntry, PresenceStore};
pub use sweep::SweepReport;
pub use types::{ClientId, GroupId, UserId};
