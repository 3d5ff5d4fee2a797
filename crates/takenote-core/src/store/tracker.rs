//! Pending-change bookkeeping between syncs

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::EntitySet;
use crate::models::EntityKey;

/// Net effect of local edits on one entity since the last sync
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

impl ChangeKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "created" => Some(Self::Created),
            "updated" => Some(Self::Updated),
            "deleted" => Some(Self::Deleted),
            _ => None,
        }
    }
}

/// One pending entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingChange {
    pub kind: ChangeKind,
    /// Time of the latest local edit (Unix ms)
    pub changed_at: i64,
    /// Monotonic per-tracker sequence, bumped on every record
    pub seq: u64,
    /// Fingerprint the entity had when first touched since the last sync
    pub base: Option<String>,
}

/// Point-in-time copy of every pending entry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    entries: BTreeMap<EntityKey, PendingChange>,
}

impl ChangeSet {
    #[must_use]
    pub fn get(&self, key: &EntityKey) -> Option<&PendingChange> {
        self.entries.get(key)
    }

    #[must_use]
    pub fn contains(&self, key: &EntityKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EntityKey, &PendingChange)> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &EntityKey> {
        self.entries.keys()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy of the set where every local entity without an entry counts as
    /// a local edit with no known base
    #[must_use]
    pub fn with_untracked(&self, local: &EntitySet) -> Self {
        let notes = local
            .notes
            .values()
            .map(|note| (EntityKey::Note(note.id), note.updated_at));
        let categories = local
            .categories
            .values()
            .map(|category| (EntityKey::Category(category.id.clone()), category.updated_at));

        let mut entries = self.entries.clone();
        for (key, updated_at) in notes.chain(categories) {
            entries.entry(key).or_insert(PendingChange {
                kind: ChangeKind::Updated,
                changed_at: updated_at,
                seq: 0,
                base: None,
            });
        }
        Self { entries }
    }
}

/// Records which entities changed locally since the last successful sync.
///
/// At most one entry exists per key; a later record collapses into the
/// earlier one so the entry always describes the net effect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeTracker {
    pending: ChangeSet,
    next_seq: u64,
    /// Entries with `seq` below this mark belong to an in-flight sync
    capture_mark: Option<u64>,
}

impl ChangeTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a tracker from persisted entries
    #[must_use]
    pub fn from_entries(entries: impl IntoIterator<Item = (EntityKey, PendingChange)>) -> Self {
        let entries: BTreeMap<_, _> = entries.into_iter().collect();
        let next_seq = entries
            .values()
            .map(|change| change.seq.saturating_add(1))
            .max()
            .unwrap_or(0);
        Self {
            pending: ChangeSet { entries },
            next_seq,
            capture_mark: None,
        }
    }

    /// Record an edit, collapsing it with any prior entry for the same key.
    ///
    /// `base` is only consulted when no entry exists yet.
    pub fn record(&mut self, key: EntityKey, kind: ChangeKind, base: Option<String>, at: i64) {
        let seq = self.next_seq;
        self.next_seq += 1;

        let Some(prior) = self.pending.entries.get(&key) else {
            self.pending.entries.insert(
                key,
                PendingChange {
                    kind,
                    changed_at: at,
                    seq,
                    base,
                },
            );
            return;
        };

        let collapsed = match (prior.kind, kind) {
            // Never pushed: created then deleted leaves nothing behind, unless
            // an in-flight sync is about to publish the creation.
            (ChangeKind::Created, ChangeKind::Deleted) => {
                if self.is_captured(prior.seq) {
                    Some(ChangeKind::Deleted)
                } else {
                    None
                }
            }
            (ChangeKind::Created, _) => Some(ChangeKind::Created),
            (_, ChangeKind::Deleted) => Some(ChangeKind::Deleted),
            (ChangeKind::Updated | ChangeKind::Deleted, _) => Some(ChangeKind::Updated),
        };

        match collapsed {
            Some(kind) => {
                let base = prior.base.clone();
                self.pending.entries.insert(
                    key,
                    PendingChange {
                        kind,
                        changed_at: at,
                        seq,
                        base,
                    },
                );
            }
            None => {
                self.pending.entries.remove(&key);
            }
        }
    }

    /// Copy of the current pending set
    #[must_use]
    pub fn pending_changes(&self) -> ChangeSet {
        self.pending.clone()
    }

    #[must_use]
    pub fn get(&self, key: &EntityKey) -> Option<&PendingChange> {
        self.pending.get(key)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Drop entries for the given keys unconditionally
    pub fn clear<'a>(&mut self, keys: impl IntoIterator<Item = &'a EntityKey>) {
        for key in keys {
            self.pending.entries.remove(key);
        }
    }

    /// Snapshot the pending set for a sync and mark it in flight
    pub fn begin_capture(&mut self) -> ChangeSet {
        self.capture_mark = Some(self.next_seq);
        self.pending.clone()
    }

    /// Forget the in-flight mark without touching any entry
    pub fn abort_capture(&mut self) {
        self.capture_mark = None;
    }

    /// Whether the entry for `key` changed after `captured` was taken
    #[must_use]
    pub fn touched_since(&self, key: &EntityKey, captured: &ChangeSet) -> bool {
        match (self.pending.get(key), captured.get(key)) {
            (Some(current), Some(snapshot)) => current.seq != snapshot.seq,
            (Some(_), None) | (None, Some(_)) => true,
            (None, None) => false,
        }
    }

    /// Settle a committed sync.
    ///
    /// Entries still identical to the captured ones are removed. Entries
    /// edited after the capture stay pending, rebased onto `pushed`, the
    /// fingerprints the remote now holds.
    pub fn acknowledge(&mut self, captured: &ChangeSet, pushed: &BTreeMap<EntityKey, String>) {
        for (key, snapshot) in captured.iter() {
            let Some(current) = self.pending.entries.get_mut(key) else {
                continue;
            };
            if current.seq == snapshot.seq {
                self.pending.entries.remove(key);
                continue;
            }
            current.base = pushed.get(key).cloned();
            if current.kind == ChangeKind::Created && current.base.is_some() {
                current.kind = ChangeKind::Updated;
            }
        }
        self.capture_mark = None;
    }

    fn is_captured(&self, seq: u64) -> bool {
        self.capture_mark.is_some_and(|mark| seq < mark)
    }
}
