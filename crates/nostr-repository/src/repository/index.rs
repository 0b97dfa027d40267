use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::events::{Address, NostrEvent};

/// Events keyed by id, in insertion order.
pub(crate) type Bucket = IndexMap<String, Arc<NostrEvent>>;

/// Tombstone timestamps keyed by id or address. Entries only ever move forward.
#[derive(Debug, Default)]
pub(crate) struct Tombstones(HashMap<String, u64>);

impl Tombstones {
    pub(crate) fn merge(&mut self, key: &str, created_at: u64) {
        let entry = self.0.entry(key.to_string()).or_insert(created_at);
        *entry = (*entry).max(created_at);
    }

    pub(crate) fn get(&self, key: &str) -> Option<u64> {
        self.0.get(key).copied()
    }

    pub(crate) fn keys(&self) -> BTreeSet<String> {
        self.0.keys().cloned().collect()
    }
}

/// Result of applying one event to the indexes.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Outcome {
    Accepted { removed: BTreeSet<String> },
    Duplicate,
    Deleted,
    Stale,
}

/// Every secondary index of the repository. Only [`Indexes::apply`] and
/// [`Indexes::clear`] mutate it.
#[derive(Debug, Default)]
pub(crate) struct Indexes {
    pub(crate) by_id: Bucket,
    pub(crate) by_address: HashMap<String, Arc<NostrEvent>>,
    pub(crate) by_wrap: HashMap<String, Arc<NostrEvent>>,
    pub(crate) by_tag: HashMap<String, Bucket>,
    pub(crate) by_day: BTreeMap<u64, Bucket>,
    pub(crate) by_author: HashMap<String, Bucket>,
    pub(crate) deletes: Tombstones,
}

impl Indexes {
    pub(crate) fn apply(&mut self, event: Arc<NostrEvent>) -> Outcome {
        if self.by_id.contains_key(&event.id) {
            return Outcome::Duplicate;
        }
        if self.is_deleted(&event) {
            return Outcome::Deleted;
        }

        let address = event.address().to_string();
        let mut removed = BTreeSet::new();

        let superseded = match self.by_address.get(&address) {
            Some(current) if current.created_at >= event.created_at => return Outcome::Stale,
            Some(current) => Some(Arc::clone(current)),
            None => None,
        };

        if let Some(previous) = &superseded {
            self.deletes.merge(&previous.id, event.created_at);
            removed.insert(previous.id.clone());
            self.unindex(previous);
        }

        self.by_id.insert(event.id.clone(), Arc::clone(&event));
        if event.is_replaceable() {
            self.by_address.insert(address, Arc::clone(&event));
        }
        // Forward entries are never cleaned up, even once the inner event is superseded.
        if let Some(wrap) = &event.wrap {
            self.by_wrap.insert(wrap.id.clone(), Arc::clone(&event));
        }

        insert(self.by_day.entry(event.day()).or_default(), &event);
        insert(self.by_author.entry(event.pubkey.clone()).or_default(), &event);

        for tag in &event.tags {
            let Some(key) = tag.index_key() else {
                continue;
            };
            insert(self.by_tag.entry(key).or_default(), &event);

            if event.is_deletion() {
                let Some(target) = tag.value() else {
                    continue;
                };
                self.deletes.merge(target, event.created_at);
                if let Some(deleted) = self.get(target) {
                    if self.is_deleted(deleted) {
                        removed.insert(deleted.id.clone());
                    }
                }
            }
        }

        Outcome::Accepted { removed }
    }

    /// Drops everything and returns the ids that were known.
    pub(crate) fn clear(&mut self) -> BTreeSet<String> {
        let ids = self.by_id.keys().cloned().collect();
        *self = Self::default();
        ids
    }

    /// Removes a superseded event from its own day, author and tag buckets.
    fn unindex(&mut self, event: &NostrEvent) {
        remove_by_day(&mut self.by_day, event.day(), &event.id);
        remove_by_key(&mut self.by_author, &event.pubkey, &event.id);
        for key in event.tags.iter().filter_map(|tag| tag.index_key()) {
            remove_by_key(&mut self.by_tag, &key, &event.id);
        }
    }

    /// Looks up an address (`kind:pubkey:d`) through the address index,
    /// anything else by id.
    pub(crate) fn get(&self, id_or_address: &str) -> Option<&Arc<NostrEvent>> {
        if Address::parse(id_or_address).is_some() {
            self.by_address.get(id_or_address)
        } else {
            self.by_id.get(id_or_address)
        }
    }

    pub(crate) fn is_deleted_by_id(&self, event: &NostrEvent) -> bool {
        self.deletes
            .get(&event.id)
            .is_some_and(|deleted_at| deleted_at > event.created_at)
    }

    pub(crate) fn is_deleted_by_address(&self, event: &NostrEvent) -> bool {
        self.deletes
            .get(&event.address().to_string())
            .is_some_and(|deleted_at| deleted_at > event.created_at)
    }

    pub(crate) fn is_deleted(&self, event: &NostrEvent) -> bool {
        self.is_deleted_by_address(event) || self.is_deleted_by_id(event)
    }

    pub(crate) fn has_event(&self, event: &NostrEvent) -> bool {
        self.by_id
            .get(&event.id)
            .or_else(|| self.by_address.get(&event.address().to_string()))
            .is_some_and(|existing| existing.created_at >= event.created_at)
    }
}

fn insert(bucket: &mut Bucket, event: &Arc<NostrEvent>) {
    bucket.insert(event.id.clone(), Arc::clone(event));
}

fn remove_by_day(buckets: &mut BTreeMap<u64, Bucket>, day: u64, id: &str) {
    if let Some(bucket) = buckets.get_mut(&day) {
        bucket.shift_remove(id);
        if bucket.is_empty() {
            buckets.remove(&day);
        }
    }
}

fn remove_by_key(buckets: &mut HashMap<String, Bucket>, key: &str, id: &str) {
    if let Some(bucket) = buckets.get_mut(key) {
        bucket.shift_remove(id);
        if bucket.is_empty() {
            buckets.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{d_tag, e_tag, NostrTag, KIND_DELETION};

    fn event(id: &str, kind: u16, created_at: u64, tags: Vec<NostrTag>) -> Arc<NostrEvent> {
        Arc::new(NostrEvent {
            id: id.to_string(),
            pubkey: "alice".to_string(),
            created_at,
            kind,
            tags,
            content: String::new(),
            sig: String::new(),
            wrap: None,
        })
    }

    fn accepted(outcome: Outcome) -> BTreeSet<String> {
        match outcome {
            Outcome::Accepted { removed } => removed,
            other => panic!("expected acceptance, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_id_is_rejected() {
        let mut indexes = Indexes::default();
        accepted(indexes.apply(event("a", 1, 10, vec![])));
        assert_eq!(indexes.apply(event("a", 1, 10, vec![])), Outcome::Duplicate);
        assert_eq!(indexes.by_id.len(), 1);
        assert_eq!(indexes.by_author["alice"].len(), 1);
    }

    #[test]
    fn test_superseded_event_leaves_every_bucket() {
        let mut indexes = Indexes::default();
        let old = event(
            "old",
            30_023,
            100,
            vec![d_tag("post"), NostrTag::new("t", vec!["x".into()])],
        );
        let new = event("new", 30_023, 86_400 * 3, vec![d_tag("post")]);

        accepted(indexes.apply(Arc::clone(&old)));
        let removed = accepted(indexes.apply(Arc::clone(&new)));

        assert_eq!(removed, BTreeSet::from(["old".to_string()]));
        assert_eq!(indexes.deletes.get("old"), Some(86_400 * 3));
        assert!(indexes.by_id.contains_key("old"));
        assert_eq!(indexes.by_address["30023:alice:post"].id, "new");
        assert!(!indexes.by_day.contains_key(&0));
        assert!(!indexes.by_tag.contains_key("t:x"));
        assert!(!indexes.by_tag["d:post"].contains_key("old"));
        assert!(!indexes.by_author["alice"].contains_key("old"));
        assert!(indexes.is_deleted(&old));
    }

    #[test]
    fn test_stale_and_tied_replacements_are_rejected() {
        let mut indexes = Indexes::default();
        accepted(indexes.apply(event("a", 0, 100, vec![])));
        assert_eq!(indexes.apply(event("b", 0, 100, vec![])), Outcome::Stale);
        assert_eq!(indexes.apply(event("c", 0, 99, vec![])), Outcome::Stale);
        assert!(!indexes.by_id.contains_key("b"));
    }

    #[test]
    fn test_deletion_only_counts_when_newer_than_target() {
        let mut indexes = Indexes::default();
        let target = event("x", 1, 60, vec![]);
        accepted(indexes.apply(Arc::clone(&target)));

        let early = accepted(indexes.apply(event("d1", KIND_DELETION, 50, vec![e_tag("x")])));
        assert!(early.is_empty());
        assert!(!indexes.is_deleted(&target));

        let late = accepted(indexes.apply(event("d2", KIND_DELETION, 70, vec![e_tag("x")])));
        assert_eq!(late, BTreeSet::from(["x".to_string()]));
        assert!(indexes.is_deleted_by_id(&target));
    }

    #[test]
    fn test_tombstones_never_rewind() {
        let mut tombstones = Tombstones::default();
        tombstones.merge("x", 70);
        tombstones.merge("x", 50);
        assert_eq!(tombstones.get("x"), Some(70));
        tombstones.merge("x", 90);
        assert_eq!(tombstones.get("x"), Some(90));
    }

    #[test]
    fn test_deleted_address_blocks_older_events() {
        let mut indexes = Indexes::default();
        accepted(indexes.apply(event(
            "d",
            KIND_DELETION,
            200,
            vec![NostrTag::new("a", vec!["30023:alice:post".into()])],
        )));

        assert_eq!(
            indexes.apply(event("old", 30_023, 150, vec![d_tag("post")])),
            Outcome::Deleted
        );
        accepted(indexes.apply(event("new", 30_023, 250, vec![d_tag("post")])));
    }

    #[test]
    fn test_wrap_index_points_at_inner_event() {
        let mut indexes = Indexes::default();
        let mut inner = NostrEvent::clone(&event("inner", 14, 10, vec![]));
        inner.wrap = Some(Box::new(NostrEvent::clone(&event("outer", 1059, 12, vec![]))));
        accepted(indexes.apply(Arc::new(inner)));

        assert_eq!(indexes.by_wrap["outer"].id, "inner");
    }

    #[test]
    fn test_wrap_entry_outlives_superseded_inner_event() {
        let mut indexes = Indexes::default();
        let mut inner = NostrEvent::clone(&event("v1", 30_078, 10, vec![d_tag("settings")]));
        inner.wrap = Some(Box::new(NostrEvent::clone(&event("outer", 1059, 12, vec![]))));
        accepted(indexes.apply(Arc::new(inner)));

        let removed = accepted(indexes.apply(event("v2", 30_078, 20, vec![d_tag("settings")])));
        assert_eq!(removed, BTreeSet::from(["v1".to_string()]));
        assert_eq!(indexes.by_address["30078:alice:settings"].id, "v2");

        let wrapped = &indexes.by_wrap["outer"];
        assert_eq!(wrapped.id, "v1");
        assert!(indexes.is_deleted(wrapped));
    }

    #[test]
    fn test_has_event() {
        let mut indexes = Indexes::default();
        accepted(indexes.apply(event("a", 0, 100, vec![])));

        assert!(indexes.has_event(&event("a", 0, 100, vec![])));
        assert!(indexes.has_event(&event("b", 0, 90, vec![])));
        assert!(indexes.has_event(&event("c", 0, 100, vec![])));
        assert!(!indexes.has_event(&event("d", 0, 101, vec![])));
        assert!(!indexes.has_event(&event("e", 1, 10, vec![])));
    }

    #[test]
    fn test_clear_returns_known_ids() {
        let mut indexes = Indexes::default();
        accepted(indexes.apply(event("a", 1, 10, vec![])));
        accepted(indexes.apply(event("b", KIND_DELETION, 20, vec![e_tag("a")])));

        let ids = indexes.clear();
        assert_eq!(ids, BTreeSet::from(["a".to_string(), "b".to_string()]));
        assert!(indexes.by_id.is_empty());
        assert!(indexes.deletes.keys().is_empty());
    }
}
