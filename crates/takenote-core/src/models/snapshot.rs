//! Remote snapshot model

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{Category, CategoryId, Note, NoteId};

/// Identifies one synchronized entity
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum EntityKey {
    Note(NoteId),
    Category(CategoryId),
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Note(id) => write!(f, "note:{id}"),
            Self::Category(id) => write!(f, "category:{id}"),
        }
    }
}

/// Deletion marker carried in the snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tombstone {
    pub key: EntityKey,
    /// When the entity was deleted (Unix ms)
    pub deleted_at: i64,
}

/// The full remote document: every note, category and recent deletion.
///
/// A snapshot is never edited in place; each successful push writes a new
/// one with `version` one above the snapshot it was merged against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSnapshot {
    pub version: u64,
    /// When this snapshot was written (Unix ms)
    pub written_at: i64,
    #[serde(default)]
    pub notes: Vec<Note>,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub tombstones: Vec<Tombstone>,
}

impl SyncSnapshot {
    /// The state of a remote that has never been written
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            version: 0,
            written_at: 0,
            notes: Vec::new(),
            categories: Vec::new(),
            tombstones: Vec::new(),
        }
    }

    #[must_use]
    pub fn note(&self, id: &NoteId) -> Option<&Note> {
        self.notes.iter().find(|note| &note.id == id)
    }

    #[must_use]
    pub fn category(&self, id: &CategoryId) -> Option<&Category> {
        self.categories.iter().find(|category| &category.id == id)
    }

    #[must_use]
    pub fn tombstone(&self, key: &EntityKey) -> Option<&Tombstone> {
        self.tombstones.iter().find(|tombstone| &tombstone.key == key)
    }

    /// Equality ignoring the version stamp
    #[must_use]
    pub fn same_content(&self, other: &Self) -> bool {
        self.notes == other.notes
            && self.categories == other.categories
            && self.tombstones == other.tombstones
    }

    /// Sort every collection into its canonical order
    pub fn normalize(&mut self) {
        self.notes.sort_by(|a, b| a.id.cmp(&b.id));
        self.categories
            .sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.id.cmp(&b.id)));
        self.tombstones.sort_by(|a, b| a.key.cmp(&b.key));
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

impl Default for SyncSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn entity_key_serializes_tagged() {
        let key = EntityKey::Category(CategoryId::from_raw("work"));
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, r#"{"kind":"category","id":"work"}"#);
        assert_eq!(key.to_string(), "category:work");
    }

    #[test]
    fn json_roundtrip_preserves_snapshot() {
        let mut snapshot = SyncSnapshot {
            version: 4,
            written_at: 1_000,
            notes: vec![Note::new("hello", 5)],
            categories: vec![Category::new("Work", 0, 5).unwrap()],
            tombstones: vec![Tombstone {
                key: EntityKey::Note(NoteId::new()),
                deleted_at: 7,
            }],
        };
        snapshot.normalize();

        let parsed = SyncSnapshot::from_json(&snapshot.to_json().unwrap()).unwrap();
        assert_eq!(parsed, snapshot);
    }

    #[test]
    fn missing_collections_default_to_empty() {
        let parsed = SyncSnapshot::from_json(r#"{"version":2,"written_at":9}"#).unwrap();
        assert_eq!(parsed.version, 2);
        assert!(parsed.notes.is_empty() && parsed.categories.is_empty());
    }

    #[test]
    fn same_content_ignores_version() {
        let a = SyncSnapshot {
            version: 1,
            written_at: 1,
            ..SyncSnapshot::empty()
        };
        let b = SyncSnapshot {
            version: 2,
            written_at: 2,
            ..SyncSnapshot::empty()
        };
        assert!(a.same_content(&b));
    }
}
