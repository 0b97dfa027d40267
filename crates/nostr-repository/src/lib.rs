//! In-memory, multi-index repository of Nostr events.
//!
//! The repository holds a working set of signed events, keeps its secondary
//! indices consistent as events arrive, enforces replaceable-event and
//! deletion (NIP-09) semantics, and answers NIP-01 filter queries.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      NOSTR-REPOSITORY                            │
//! │                                                                  │
//! │   publish / load ──► TrustCheck ──► Indexes (sole mutator)       │
//! │                                       │                          │
//! │                                       ├─ by id / address / wrap  │
//! │                                       ├─ by tag / day / author   │
//! │                                       └─ tombstones              │
//! │                                       │                          │
//! │                                       ▼                          │
//! │   query ◄── single-index narrowing    Notifier ──► listeners     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Replacement and deletion
//!
//! | Rule | Behavior |
//! |------|----------|
//! | Duplicate id | rejected |
//! | Older or equal `created_at` at an address | rejected, incumbent wins |
//! | Newer `created_at` at an address | incumbent tombstoned and unindexed |
//! | Kind 5 deletion | tombstones every indexable tag value |
//! | Tombstone not newer than target | ignored |
//!
//! # Example
//!
//! ```rust,ignore
//! use nostr_repository::{Filter, Repository, RepositoryConfig};
//!
//! let repository = Repository::new(RepositoryConfig::from_env()?);
//! let (_id, mut updates) = repository.subscribe_channel();
//!
//! repository.load(events).await?;
//! let profile = repository.query(&[Filter::new().kinds([0]).authors([pubkey])]);
//! ```
//!
//! # Traits
//!
//! - [`TrustCheck`] - Gate consulted before any event mutates the store

mod config;
mod error;
mod events;
mod filter;
mod notify;
mod repository;
mod trust;

pub use config::{RepositoryConfig, DEFAULT_CHUNK_SIZE};
pub use error::Error;
pub use events::{
    a_tag, d_tag, day_of, e_tag, is_replaceable_kind, p_tag, tag_value, unix_timestamp, Address,
    NostrEvent, NostrTag, KIND_CONTACTS, KIND_DELETION, KIND_METADATA, SECONDS_PER_DAY,
};
pub use filter::{Filter, TagKey};
pub use notify::{SubscriptionId, Update};
pub use repository::{LoadStats, QueryOptions, Repository};
pub use trust::{trust_from_name, IdCheck, SignatureCheck, TrustAll, TrustCheck};

/// Crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
