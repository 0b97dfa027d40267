//! The in-memory event repository.
//!
//! [`Repository`] owns every index behind a single mutation entry point.
//! Mutators (`publish`, `clear`, and the per-chunk step of `load`) are
//! serialized by a writer lock that is held through notification, so
//! listeners observe updates in mutation order. Queries take a shared read
//! lock and never observe a partially applied event.

mod index;
mod query;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard};

use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

use crate::config::RepositoryConfig;
use crate::events::NostrEvent;
use crate::filter::Filter;
use crate::notify::{Notifier, SubscriptionId, Update};
use crate::Error;

use self::index::{Indexes, Outcome};
pub use self::query::QueryOptions;

/// Counters for a bulk [`Repository::load`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoadStats {
    pub accepted: usize,
    pub duplicates: usize,
    pub stale: usize,
    pub deleted: usize,
}

/// In-memory, multi-index store of Nostr events.
///
/// # Example
///
/// ```rust
/// use nostr_repository::{Filter, NostrEvent, Repository};
///
/// let repository = Repository::default();
/// let event = NostrEvent {
///     id: "a1".to_string(),
///     pubkey: "alice".to_string(),
///     created_at: 1_700_000_000,
///     kind: 1,
///     tags: vec![],
///     content: "gm".to_string(),
///     sig: String::new(),
///     wrap: None,
/// };
///
/// assert!(repository.publish(event.clone()).unwrap());
/// assert!(!repository.publish(event).unwrap());
///
/// let notes = repository.query(&[Filter::new().kinds([1])]);
/// assert_eq!(notes.len(), 1);
/// ```
pub struct Repository {
    indexes: RwLock<Indexes>,
    writer: Mutex<()>,
    notifier: Notifier,
    config: RepositoryConfig,
}

impl Default for Repository {
    fn default() -> Self {
        Self::new(RepositoryConfig::default())
    }
}

impl Repository {
    pub fn new(config: RepositoryConfig) -> Self {
        Self {
            indexes: RwLock::new(Indexes::default()),
            writer: Mutex::new(()),
            notifier: Notifier::new(),
            config,
        }
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    /// Stores `event` if it is new, not tombstoned, and not older than the
    /// current event at its address.
    ///
    /// Returns `Ok(false)` for benign rejections. An event failing the trust
    /// check is a caller error and returns [`Error::Untrusted`] without
    /// touching any index.
    pub fn publish(&self, event: NostrEvent) -> Result<bool, Error> {
        self.verify(&event)?;
        let _writer = self.lock_writer()?;
        match self.apply(Arc::new(event))? {
            (event, Outcome::Accepted { removed }) => {
                self.notifier.notify(&Update {
                    added: vec![event],
                    removed,
                });
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Drops every index and the tombstone table, then announces every
    /// previously known id as removed.
    pub fn clear(&self) -> Result<(), Error> {
        let _writer = self.lock_writer()?;
        let removed = self
            .indexes
            .write()
            .map_err(|_| Error::MutexPoisoned)?
            .clear();
        info!(removed = removed.len(), "Cleared repository");
        self.notifier.notify(&Update {
            added: Vec::new(),
            removed,
        });
        Ok(())
    }

    /// Replaces the contents with `events`, using the configured chunk size.
    pub async fn load<I>(&self, events: I) -> Result<LoadStats, Error>
    where
        I: IntoIterator<Item = NostrEvent>,
    {
        self.load_chunked(events, self.config.chunk_size).await
    }

    /// Clears the store, then publishes `events` in batches of `chunk_size`
    /// without per-event notifications, yielding to the scheduler after each
    /// full batch.
    ///
    /// Every event passes the trust check before the store is cleared, so an
    /// untrusted event fails the whole load without any mutation or update.
    ///
    /// Emits one aggregated update once every batch is in: `added` holds the
    /// accepted events and `removed` every key in the tombstone table.
    pub async fn load_chunked<I>(&self, events: I, chunk_size: usize) -> Result<LoadStats, Error>
    where
        I: IntoIterator<Item = NostrEvent>,
    {
        let chunk_size = chunk_size.max(1);
        let events: Vec<NostrEvent> = events.into_iter().collect();
        for event in &events {
            self.verify(event)?;
        }
        self.clear()?;

        let mut stats = LoadStats::default();
        let mut added = Vec::new();
        let mut events = events.into_iter();

        loop {
            let chunk: Vec<NostrEvent> = events.by_ref().take(chunk_size).collect();
            if chunk.is_empty() {
                break;
            }
            let full = chunk.len() == chunk_size;

            {
                let _writer = self.lock_writer()?;
                for event in chunk {
                    match self.apply(Arc::new(event))? {
                        (event, Outcome::Accepted { .. }) => {
                            stats.accepted += 1;
                            added.push(event);
                        }
                        (_, Outcome::Duplicate) => stats.duplicates += 1,
                        (_, Outcome::Stale) => stats.stale += 1,
                        (_, Outcome::Deleted) => stats.deleted += 1,
                    }
                }
            }

            if full {
                tokio::task::yield_now().await;
            }
        }

        let _writer = self.lock_writer()?;
        let removed = self.read().deletes.keys();
        info!(
            accepted = stats.accepted,
            duplicates = stats.duplicates,
            stale = stats.stale,
            deleted = stats.deleted,
            tombstones = removed.len(),
            "Loaded events into repository"
        );
        self.notifier.notify(&Update { added, removed });
        Ok(stats)
    }

    /// Events matching at least one filter, excluding tombstoned events.
    pub fn query(&self, filters: &[Filter]) -> Vec<Arc<NostrEvent>> {
        self.query_with(filters, QueryOptions::default())
    }

    pub fn query_with(&self, filters: &[Filter], options: QueryOptions) -> Vec<Arc<NostrEvent>> {
        self.read().query(filters, options)
    }

    /// Point lookup by id, or by address for `kind:pubkey:d` strings.
    pub fn get_event(&self, id_or_address: &str) -> Option<Arc<NostrEvent>> {
        self.read().get(id_or_address).cloned()
    }

    /// Inner event recorded for an outer wrapper id.
    pub fn get_wrapped(&self, wrap_id: &str) -> Option<Arc<NostrEvent>> {
        self.read().by_wrap.get(wrap_id).cloned()
    }

    /// True if an event with the same id, or a current event at the same
    /// address that is at least as new, is already stored.
    pub fn has_event(&self, event: &NostrEvent) -> bool {
        self.read().has_event(event)
    }

    pub fn is_deleted(&self, event: &NostrEvent) -> bool {
        self.read().is_deleted(event)
    }

    pub fn is_deleted_by_id(&self, event: &NostrEvent) -> bool {
        self.read().is_deleted_by_id(event)
    }

    pub fn is_deleted_by_address(&self, event: &NostrEvent) -> bool {
        self.read().is_deleted_by_address(event)
    }

    /// Every known event, superseded and deleted ones included, in insertion order.
    pub fn dump(&self) -> Vec<NostrEvent> {
        self.read()
            .by_id
            .values()
            .map(|event| NostrEvent::clone(event))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registers a listener. Listeners run synchronously after each mutation
    /// and may query the repository, but must not mutate it.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&Update) + Send + Sync + 'static,
    {
        self.notifier.subscribe(listener)
    }

    pub fn subscribe_channel(&self) -> (SubscriptionId, UnboundedReceiver<Update>) {
        self.notifier.subscribe_channel()
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.notifier.unsubscribe(id)
    }

    fn verify(&self, event: &NostrEvent) -> Result<(), Error> {
        self.config.trust.check(event).map_err(|reason| {
            warn!(
                event_id = %event.id,
                trust = self.config.trust.name(),
                reason = %reason,
                "Rejected untrusted event"
            );
            Error::Untrusted {
                id: event.id.clone(),
                reason,
            }
        })
    }

    /// One atomic index update for a verified event. Caller holds the writer lock.
    fn apply(&self, event: Arc<NostrEvent>) -> Result<(Arc<NostrEvent>, Outcome), Error> {
        let outcome = self
            .indexes
            .write()
            .map_err(|_| Error::MutexPoisoned)?
            .apply(Arc::clone(&event));

        match &outcome {
            Outcome::Accepted { removed } => {
                debug!(
                    event_id = %event.id,
                    kind = event.kind,
                    removed = removed.len(),
                    "Accepted event"
                );
            }
            rejected => {
                debug!(event_id = %event.id, reason = ?rejected, "Rejected event");
            }
        }

        Ok((event, outcome))
    }

    fn lock_writer(&self) -> Result<MutexGuard<'_, ()>, Error> {
        self.writer.lock().map_err(|_| Error::MutexPoisoned)
    }

    /// Queries never fail, so a poisoned lock is read through.
    fn read(&self) -> RwLockReadGuard<'_, Indexes> {
        self.indexes.read().unwrap_or_else(PoisonError::into_inner)
    }
}
