use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::trace;

use crate::events::{day_of, tag_index_key, unix_timestamp, NostrEvent};
use crate::filter::{Filter, TagKey};
use crate::repository::index::{Bucket, Indexes};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Also return tombstoned and superseded events.
    pub include_deleted: bool,
}

/// The single index used to narrow one filter's candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Narrowing {
    Ids(BTreeSet<String>),
    Authors(BTreeSet<String>),
    Days { first: u64, last: u64 },
    Tag(TagKey, BTreeSet<String>),
    FullScan,
}

impl Narrowing {
    /// Picks the narrowing index and returns the residual filter still to be checked.
    ///
    /// `since`/`until` stay in the residual: day buckets are coarser than the bounds.
    pub(crate) fn plan(filter: &Filter) -> (Self, Filter) {
        let mut residual = filter.clone();

        if let Some(ids) = residual.ids.take() {
            return (Self::Ids(ids), residual);
        }
        if let Some(authors) = residual.authors.take() {
            return (Self::Authors(authors), residual);
        }
        if filter.since.is_some() || filter.until.is_some() {
            let first = day_of(filter.since.unwrap_or(0));
            let last = day_of(filter.until.unwrap_or_else(unix_timestamp));
            return (Self::Days { first, last }, residual);
        }
        if let Some(key) = residual.tags.keys().next().copied() {
            let values = residual.tags.remove(&key).unwrap_or_default();
            return (Self::Tag(key, values), residual);
        }
        (Self::FullScan, residual)
    }

    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Ids(_) => "ids",
            Self::Authors(_) => "authors",
            Self::Days { .. } => "days",
            Self::Tag(..) => "tag",
            Self::FullScan => "full_scan",
        }
    }
}

impl Indexes {
    pub(crate) fn candidates(&self, narrowing: &Narrowing) -> Vec<Arc<NostrEvent>> {
        match narrowing {
            Narrowing::Ids(ids) => ids
                .iter()
                .filter_map(|id| self.by_id.get(id))
                .cloned()
                .collect(),
            Narrowing::Authors(authors) => {
                union(authors.iter().filter_map(|pubkey| self.by_author.get(pubkey)))
            }
            Narrowing::Days { first, last } if first <= last => {
                union(self.by_day.range(*first..=*last).map(|(_, bucket)| bucket))
            }
            Narrowing::Days { .. } => Vec::new(),
            Narrowing::Tag(key, values) => union(values.iter().filter_map(|value| {
                self.by_tag
                    .get(&tag_index_key(&key.letter().to_string(), value))
            })),
            Narrowing::FullScan => self.by_id.values().cloned().collect(),
        }
    }

    /// Evaluates one filter: narrow, sort newest first, then walk with the residual.
    pub(crate) fn query_filter(
        &self,
        filter: &Filter,
        options: QueryOptions,
    ) -> Vec<Arc<NostrEvent>> {
        let (narrowing, residual) = Narrowing::plan(filter);
        let mut candidates = self.candidates(&narrowing);
        candidates.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let mut matched = Vec::new();
        for event in candidates {
            if filter.limit.is_some_and(|limit| matched.len() >= limit) {
                break;
            }
            if !options.include_deleted && self.is_deleted(&event) {
                continue;
            }
            if !residual.matches(&event) {
                continue;
            }
            matched.push(event);
        }

        trace!(
            strategy = narrowing.name(),
            matched = matched.len(),
            "Evaluated filter"
        );
        matched
    }

    /// Union of all filters' results, without duplicates.
    pub(crate) fn query(&self, filters: &[Filter], options: QueryOptions) -> Vec<Arc<NostrEvent>> {
        let mut seen = HashSet::new();
        let mut merged = Vec::new();
        for filter in filters {
            for event in self.query_filter(filter, options) {
                if seen.insert(event.id.clone()) {
                    merged.push(event);
                }
            }
        }
        merged
    }
}

fn union<'a>(buckets: impl Iterator<Item = &'a Bucket>) -> Vec<Arc<NostrEvent>> {
    let mut merged: IndexMap<&str, &Arc<NostrEvent>> = IndexMap::new();
    for bucket in buckets {
        for (id, event) in bucket {
            merged.entry(id.as_str()).or_insert(event);
        }
    }
    merged.into_values().cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{d_tag, e_tag, NostrTag, KIND_DELETION, SECONDS_PER_DAY};

    fn event(
        id: &str,
        pubkey: &str,
        kind: u16,
        created_at: u64,
        tags: Vec<NostrTag>,
    ) -> Arc<NostrEvent> {
        Arc::new(NostrEvent {
            id: id.to_string(),
            pubkey: pubkey.to_string(),
            created_at,
            kind,
            tags,
            content: String::new(),
            sig: String::new(),
            wrap: None,
        })
    }

    fn ids(events: &[Arc<NostrEvent>]) -> Vec<&str> {
        events.iter().map(|event| event.id.as_str()).collect()
    }

    fn sample() -> Indexes {
        let mut indexes = Indexes::default();
        let events = [
            event("a", "alice", 1, 100, vec![e_tag("root")]),
            event("b", "bob", 1, SECONDS_PER_DAY - 1, vec![e_tag("root")]),
            event("c", "alice", 7, SECONDS_PER_DAY, vec![e_tag("other")]),
            event("d", "carol", 1, SECONDS_PER_DAY * 2 + 5, vec![]),
            event("e", "bob", 30_023, 50, vec![d_tag("post")]),
        ];
        for event in events {
            indexes.apply(event);
        }
        indexes
    }

    #[test]
    fn test_plan_priority() {
        let filter = Filter::new()
            .ids(["a"])
            .authors(["alice"])
            .since(1)
            .tag('e', ["root"]);
        let (narrowing, residual) = Narrowing::plan(&filter);
        assert_eq!(narrowing.name(), "ids");
        assert!(residual.ids.is_none());
        assert!(residual.authors.is_some());

        let filter = Filter::new().authors(["alice"]).since(1).tag('e', ["root"]);
        let (narrowing, residual) = Narrowing::plan(&filter);
        assert_eq!(narrowing.name(), "authors");
        assert!(residual.authors.is_none());
        assert_eq!(residual.since, Some(1));

        let (narrowing, residual) = Narrowing::plan(&Filter::new().since(10).tag('e', ["x"]));
        assert_eq!(
            narrowing,
            Narrowing::Days {
                first: 0,
                last: day_of(unix_timestamp())
            }
        );
        assert_eq!(residual.since, Some(10));
        assert_eq!(residual.tags.len(), 1);

        let filter = Filter::new().tag('p', ["x"]).tag('e', ["y"]);
        let (narrowing, residual) = Narrowing::plan(&filter);
        assert_eq!(
            narrowing,
            Narrowing::Tag(TagKey::new('e'), BTreeSet::from(["y".to_string()]))
        );
        assert!(residual.tags.contains_key(&TagKey::new('p')));

        let (narrowing, _) = Narrowing::plan(&Filter::new().kinds([1]));
        assert_eq!(narrowing, Narrowing::FullScan);
    }

    #[test]
    fn test_results_are_newest_first_and_limited() {
        let indexes = sample();
        let result = indexes.query_filter(&Filter::new().kinds([1]), QueryOptions::default());
        assert_eq!(ids(&result), vec!["d", "b", "a"]);

        let limited = Filter::new().kinds([1]).limit(2);
        let result = indexes.query_filter(&limited, QueryOptions::default());
        assert_eq!(ids(&result), vec!["d", "b"]);

        let result = indexes.query_filter(&Filter::new().limit(0), QueryOptions::default());
        assert!(result.is_empty());
    }

    #[test]
    fn test_day_range_respects_exact_bounds() {
        let indexes = sample();
        let filter = Filter::new().since(SECONDS_PER_DAY - 1).until(SECONDS_PER_DAY);
        let result = indexes.query_filter(&filter, QueryOptions::default());
        assert_eq!(ids(&result), vec!["c", "b"]);

        let inverted = Filter::new().since(SECONDS_PER_DAY * 3).until(10);
        assert!(indexes.query_filter(&inverted, QueryOptions::default()).is_empty());
    }

    #[test]
    fn test_tag_narrowing_unions_values() {
        let indexes = sample();
        let filter = Filter::new().tag('e', ["root", "other"]).authors(["alice"]);
        let result = indexes.query_filter(&filter, QueryOptions::default());
        assert_eq!(ids(&result), vec!["c", "a"]);

        let filter = Filter::new().tag('e', ["root", "other"]);
        let result = indexes.query_filter(&filter, QueryOptions::default());
        assert_eq!(ids(&result), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_deleted_events_hidden_unless_requested() {
        let mut indexes = sample();
        indexes.apply(event("x", "alice", KIND_DELETION, 200, vec![e_tag("a")]));

        let filter = Filter::new().ids(["a"]);
        assert!(indexes.query_filter(&filter, QueryOptions::default()).is_empty());

        let options = QueryOptions {
            include_deleted: true,
        };
        assert_eq!(ids(&indexes.query_filter(&filter, options)), vec!["a"]);
    }

    #[test]
    fn test_multiple_filters_merge_without_duplicates() {
        let indexes = sample();
        let filters = [
            Filter::new().authors(["alice"]),
            Filter::new().kinds([1]),
            Filter::new().ids(["a", "missing"]),
        ];
        let result = indexes.query(&filters, QueryOptions::default());
        let mut found = ids(&result);
        found.sort_unstable();
        assert_eq!(found, vec!["a", "b", "c", "d"]);
    }
}
