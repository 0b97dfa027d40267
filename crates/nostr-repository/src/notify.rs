//! Change notification for repository mutations.
//!
//! Every accepted `publish`, every `clear` and every `load` produces exactly
//! one [`Update`], delivered synchronously to all listeners in the order the
//! mutations were applied.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::mpsc;
use tracing::trace;

use crate::events::NostrEvent;

/// Delta emitted after a mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Update {
    pub added: Vec<Arc<NostrEvent>>,
    /// Ids (or addresses, after a load) no longer considered current.
    pub removed: BTreeSet<String>,
}

impl Update {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(&Update) + Send + Sync>;

#[derive(Default)]
pub(crate) struct Notifier {
    listeners: RwLock<Vec<(SubscriptionId, Listener)>>,
    next_id: AtomicU64,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&Update) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(listener)));
        id
    }

    /// Forwards every update into an unbounded channel, preserving order.
    pub fn subscribe_channel(&self) -> (SubscriptionId, mpsc::UnboundedReceiver<Update>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.subscribe(move |update| {
            if tx.send(update.clone()).is_err() {
                trace!("Update receiver dropped");
            }
        });
        (id, rx)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Calls listeners outside the registry lock so they may (un)subscribe.
    pub(crate) fn notify(&self, update: &Update) {
        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in listeners {
            listener(update);
        }
    }
}
