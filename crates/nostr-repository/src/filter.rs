//! NIP-01 filters and the matching predicate used by the query evaluator.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::events::NostrEvent;

/// Key of a `#<letter>` tag filter field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TagKey(char);

impl TagKey {
    pub fn new(letter: char) -> Self {
        Self(letter)
    }

    pub fn letter(&self) -> char {
        self.0
    }

    /// True when `name` is exactly this single letter.
    pub fn matches_name(&self, name: &str) -> bool {
        let mut chars = name.chars();
        chars.next() == Some(self.0) && chars.next().is_none()
    }
}

impl fmt::Display for TagKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl Serialize for TagKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TagKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let mut chars = raw.chars();
        match (chars.next(), chars.next(), chars.next()) {
            (Some('#'), Some(letter), None) => Ok(Self(letter)),
            _ => Err(de::Error::custom(format!(
                "unsupported filter field `{raw}`"
            ))),
        }
    }
}

/// A NIP-01 filter. Absent fields are unconstrained.
///
/// ```rust
/// use nostr_repository::Filter;
///
/// let filter = Filter::new().kinds([1]).tag('e', ["abc"]).limit(20);
/// let json = serde_json::to_string(&filter).unwrap();
/// assert_eq!(json, r##"{"kinds":[1],"limit":20,"#e":["abc"]}"##);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ids: Option<BTreeSet<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authors: Option<BTreeSet<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kinds: Option<BTreeSet<u16>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(flatten)]
    pub tags: BTreeMap<TagKey, BTreeSet<String>>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn authors<I, S>(mut self, authors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authors = Some(authors.into_iter().map(Into::into).collect());
        self
    }

    pub fn kinds<I>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = u16>,
    {
        self.kinds = Some(kinds.into_iter().collect());
        self
    }

    pub fn since(mut self, since: u64) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: u64) -> Self {
        self.until = Some(until);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Adds a `#<letter>` constraint; repeated calls for the same letter extend the set.
    pub fn tag<I, S>(mut self, letter: char, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags
            .entry(TagKey::new(letter))
            .or_default()
            .extend(values.into_iter().map(Into::into));
        self
    }

    /// True iff every present field is satisfied by `event`. `limit` is not a predicate.
    pub fn matches(&self, event: &NostrEvent) -> bool {
        if let Some(ids) = &self.ids {
            if !ids.contains(&event.id) {
                return false;
            }
        }

        if let Some(authors) = &self.authors {
            if !authors.contains(&event.pubkey) {
                return false;
            }
        }

        if let Some(kinds) = &self.kinds {
            if !kinds.contains(&event.kind) {
                return false;
            }
        }

        if self.since.is_some_and(|since| event.created_at < since) {
            return false;
        }

        if self.until.is_some_and(|until| event.created_at > until) {
            return false;
        }

        self.tags.iter().all(|(key, values)| {
            event.tags.iter().any(|tag| {
                key.matches_name(&tag.name) && tag.value().is_some_and(|v| values.contains(v))
            })
        })
    }
}
