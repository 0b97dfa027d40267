use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use nostr_sdk::prelude::{Event, Tag};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const KIND_METADATA: u16 = 0;
pub const KIND_CONTACTS: u16 = 3;
pub const KIND_DELETION: u16 = 5;

pub const SECONDS_PER_DAY: u64 = 86_400;

/// Kinds where only the newest event per address is retained (NIP-01).
pub fn is_replaceable_kind(kind: u16) -> bool {
    kind == KIND_METADATA
        || kind == KIND_CONTACTS
        || (10_000..20_000).contains(&kind)
        || (30_000..40_000).contains(&kind)
}

/// Day bucket for a unix timestamp.
pub fn day_of(timestamp: u64) -> u64 {
    timestamp / SECONDS_PER_DAY
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct NostrTag {
    pub name: String,
    pub values: Vec<String>,
}

impl NostrTag {
    pub fn new(name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn from_sdk_tag(tag: &Tag) -> Self {
        Self::from(tag.clone().to_vec())
    }

    /// First value after the tag name.
    pub fn value(&self) -> Option<&str> {
        self.values.first().map(|s| s.as_str())
    }

    /// Single-character tag names are eligible for tag-bucket indexing.
    pub fn is_indexable(&self) -> bool {
        let mut chars = self.name.chars();
        chars.next().is_some() && chars.next().is_none()
    }

    /// `"<letter>:<value>"` bucket key, if the tag is indexable and carries a value.
    pub fn index_key(&self) -> Option<String> {
        if !self.is_indexable() {
            return None;
        }
        self.value().map(|value| tag_index_key(&self.name, value))
    }

    pub fn to_vec(&self) -> Vec<String> {
        let mut parts = Vec::with_capacity(1 + self.values.len());
        parts.push(self.name.clone());
        parts.extend(self.values.iter().cloned());
        parts
    }
}

impl From<Vec<String>> for NostrTag {
    fn from(parts: Vec<String>) -> Self {
        let mut parts = parts.into_iter();
        let name = parts.next().unwrap_or_default();
        Self {
            name,
            values: parts.collect(),
        }
    }
}

impl From<NostrTag> for Vec<String> {
    fn from(tag: NostrTag) -> Self {
        let mut parts = Vec::with_capacity(1 + tag.values.len());
        parts.push(tag.name);
        parts.extend(tag.values);
        parts
    }
}

pub fn tag_index_key(name: &str, value: &str) -> String {
    format!("{name}:{value}")
}

/// A signed Nostr event in its NIP-01 JSON shape.
///
/// `wrap` carries the outer envelope when this event was unsealed from a
/// gift wrap; it is never part of the signed payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NostrEvent {
    pub id: String,
    pub pubkey: String,
    pub created_at: u64,
    pub kind: u16,
    pub tags: Vec<NostrTag>,
    pub content: String,
    #[serde(default)]
    pub sig: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wrap: Option<Box<NostrEvent>>,
}

impl NostrEvent {
    pub fn from_event(event: &Event) -> Self {
        let tags = event.tags.iter().map(NostrTag::from_sdk_tag).collect();

        Self {
            id: event.id.to_string(),
            pubkey: event.pubkey.to_string(),
            created_at: event.created_at.as_secs(),
            kind: event.kind.as_u16(),
            tags,
            content: event.content.clone(),
            sig: event.sig.to_string(),
            wrap: None,
        }
    }

    pub fn address(&self) -> Address {
        Address::of(self)
    }

    pub fn is_replaceable(&self) -> bool {
        is_replaceable_kind(self.kind)
    }

    pub fn is_deletion(&self) -> bool {
        self.kind == KIND_DELETION
    }

    pub fn day(&self) -> u64 {
        day_of(self.created_at)
    }

    pub fn tag_value(&self, name: &str) -> Option<&str> {
        tag_value(&self.tags, name)
    }

    /// Recomputes the NIP-01 id: sha256 over `[0,pubkey,created_at,kind,tags,content]`.
    pub fn compute_id(&self) -> String {
        let payload = serde_json::json!([
            0,
            &self.pubkey,
            self.created_at,
            self.kind,
            &self.tags,
            &self.content
        ]);
        hex::encode(Sha256::digest(payload.to_string().as_bytes()))
    }

    /// The signed event as NIP-01 JSON, without the local `wrap` reference.
    pub fn nip01_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&SignedEventRef {
            id: &self.id,
            pubkey: &self.pubkey,
            created_at: self.created_at,
            kind: self.kind,
            tags: &self.tags,
            content: &self.content,
            sig: &self.sig,
        })
    }
}

#[derive(Serialize)]
struct SignedEventRef<'a> {
    id: &'a str,
    pubkey: &'a str,
    created_at: u64,
    kind: u16,
    tags: &'a [NostrTag],
    content: &'a str,
    sig: &'a str,
}

/// Logical slot of a replaceable event: `kind:pubkey:d`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address {
    pub kind: u16,
    pub pubkey: String,
    pub identifier: String,
}

impl Address {
    pub fn of(event: &NostrEvent) -> Self {
        Self {
            kind: event.kind,
            pubkey: event.pubkey.clone(),
            identifier: event.tag_value("d").unwrap_or_default().to_string(),
        }
    }

    /// Parses `kind:pubkey:identifier`. The identifier may itself contain `:`.
    pub fn parse(value: &str) -> Option<Self> {
        let mut parts = value.splitn(3, ':');
        let kind = parts.next()?.parse().ok()?;
        let pubkey = parts.next()?;
        let identifier = parts.next()?;
        if pubkey.is_empty() {
            return None;
        }
        Some(Self {
            kind,
            pubkey: pubkey.to_string(),
            identifier: identifier.to_string(),
        })
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.kind, self.pubkey, self.identifier)
    }
}

pub fn d_tag(id: &str) -> NostrTag {
    NostrTag::new("d", vec![id.to_string()])
}

pub fn e_tag(event_id: &str) -> NostrTag {
    NostrTag::new("e", vec![event_id.to_string()])
}

pub fn a_tag(address: &Address) -> NostrTag {
    NostrTag::new("a", vec![address.to_string()])
}

pub fn p_tag(pubkey: &str) -> NostrTag {
    NostrTag::new("p", vec![pubkey.to_string()])
}

pub fn tag_value<'a>(tags: &'a [NostrTag], name: &str) -> Option<&'a str> {
    tags.iter()
        .find(|tag| tag.name == name)
        .and_then(|tag| tag.value())
}

pub fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
