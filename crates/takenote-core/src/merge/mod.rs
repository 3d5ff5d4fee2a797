//! Merge engine: reconciles captured local state with a remote snapshot.
//!
//! The merge never fails. For every entity it decides which version
//! survives, last-writer-wins on `updated_at` when both sides diverged, and
//! records the losing version as a [`SyncConflict`].

use std::collections::{BTreeMap, BTreeSet};

use crate::models::{
    Category, CategoryId, ConflictResolution, DiscardedVersion, EntityKey, Note, NoteId,
    SyncConflict, SyncSnapshot, Tombstone,
};
use crate::store::{ChangeKind, ChangeSet, EntitySet, PendingChange};

/// Knobs for one merge run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeOptions {
    /// Merge time (Unix ms), stamped on conflicts and the new snapshot
    pub now: i64,
    /// Tombstones older than this many ms are dropped from the new snapshot
    pub tombstone_retention_ms: i64,
}

/// Result of a merge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Reconciled entities to install locally
    pub entities: EntitySet,
    /// Snapshot to publish, `version` one above the remote's
    pub snapshot: SyncSnapshot,
    /// Keys whose published state differs from the remote snapshot
    pub write_set: BTreeSet<EntityKey>,
    pub conflicts: Vec<SyncConflict>,
    /// Entities taken from the remote that were new or different locally
    pub adopted: usize,
    /// Local entities dropped because the remote deleted them
    pub removed: usize,
}

impl MergeOutcome {
    /// Whether the remote needs a new snapshot
    #[must_use]
    pub fn needs_push(&self) -> bool {
        !self.write_set.is_empty()
    }

    /// Fingerprint of every entity in the published snapshot
    #[must_use]
    pub fn pushed_fingerprints(&self) -> BTreeMap<EntityKey, String> {
        let notes = self
            .snapshot
            .notes
            .iter()
            .map(|note| (EntityKey::Note(note.id), note.fingerprint()));
        let categories = self
            .snapshot
            .categories
            .iter()
            .map(|category| (EntityKey::Category(category.id.clone()), category.fingerprint()));
        notes.chain(categories).collect()
    }
}

/// Common view over notes and categories for the per-entity rules
trait Syncable: Clone {
    fn fingerprint(&self) -> String;
    fn updated_at(&self) -> i64;
    fn discarded(&self) -> DiscardedVersion;
}

impl Syncable for Note {
    fn fingerprint(&self) -> String {
        Note::fingerprint(self)
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn discarded(&self) -> DiscardedVersion {
        DiscardedVersion::Note(self.clone())
    }
}

impl Syncable for Category {
    fn fingerprint(&self) -> String {
        Category::fingerprint(self)
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn discarded(&self) -> DiscardedVersion {
        DiscardedVersion::Category(self.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Local,
    Remote,
}

/// Per-entity decision
struct Resolution<T> {
    value: Option<(T, Origin)>,
    /// A local deletion to publish
    deletion: Option<i64>,
    conflict: Option<SyncConflict>,
}

impl<T> Resolution<T> {
    const fn keep(value: T, origin: Origin) -> Self {
        Self {
            value: Some((value, origin)),
            deletion: None,
            conflict: None,
        }
    }

    const fn gone() -> Self {
        Self {
            value: None,
            deletion: None,
            conflict: None,
        }
    }

    fn with_conflict(mut self, conflict: SyncConflict) -> Self {
        self.conflict = Some(conflict);
        self
    }
}

fn conflict(
    key: EntityKey,
    local_updated_at: i64,
    remote_updated_at: i64,
    resolution: ConflictResolution,
    discarded: DiscardedVersion,
    now: i64,
) -> SyncConflict {
    SyncConflict {
        key,
        local_updated_at,
        remote_updated_at,
        resolution,
        discarded,
        resolved_at: now,
    }
}

/// Decide the fate of one entity
fn resolve<T: Syncable>(
    key: &EntityKey,
    local: Option<&T>,
    remote: Option<&T>,
    pending: Option<&PendingChange>,
    remote_tombstone: Option<&Tombstone>,
    now: i64,
) -> Resolution<T> {
    let Some(pending) = pending else {
        // Untouched locally: the remote is authoritative, including its
        // deletions.
        return remote.map_or_else(Resolution::gone, |remote| {
            Resolution::keep(remote.clone(), Origin::Remote)
        });
    };

    match (pending.kind, local, remote) {
        (ChangeKind::Created | ChangeKind::Updated, Some(local), Some(remote)) => {
            let remote_fp = remote.fingerprint();
            if local.fingerprint() == remote_fp {
                return Resolution::keep(remote.clone(), Origin::Remote);
            }
            let local_newer = local.updated_at() > remote.updated_at();
            if local_newer && pending.base.as_deref() == Some(remote_fp.as_str()) {
                return Resolution::keep(local.clone(), Origin::Local);
            }
            if local_newer {
                Resolution::keep(local.clone(), Origin::Local).with_conflict(conflict(
                    key.clone(),
                    local.updated_at(),
                    remote.updated_at(),
                    ConflictResolution::LocalWins,
                    remote.discarded(),
                    now,
                ))
            } else {
                Resolution::keep(remote.clone(), Origin::Remote).with_conflict(conflict(
                    key.clone(),
                    local.updated_at(),
                    remote.updated_at(),
                    ConflictResolution::RemoteWins,
                    local.discarded(),
                    now,
                ))
            }
        }
        (ChangeKind::Created | ChangeKind::Updated, Some(local), None) => match remote_tombstone {
            None => Resolution::keep(local.clone(), Origin::Local),
            Some(tombstone) if local.updated_at() > tombstone.deleted_at => {
                Resolution::keep(local.clone(), Origin::Local).with_conflict(conflict(
                    key.clone(),
                    local.updated_at(),
                    tombstone.deleted_at,
                    ConflictResolution::LocalWins,
                    DiscardedVersion::Deletion {
                        deleted_at: tombstone.deleted_at,
                    },
                    now,
                ))
            }
            Some(tombstone) => Resolution::gone().with_conflict(conflict(
                key.clone(),
                local.updated_at(),
                tombstone.deleted_at,
                ConflictResolution::RemoteWins,
                local.discarded(),
                now,
            )),
        },
        (ChangeKind::Created | ChangeKind::Updated, None, remote) => {
            remote.map_or_else(Resolution::gone, |remote| {
                Resolution::keep(remote.clone(), Origin::Remote)
            })
        }
        (ChangeKind::Deleted, _, Some(remote)) => {
            if pending.changed_at > remote.updated_at() {
                let diverged = pending
                    .base
                    .as_deref()
                    .is_some_and(|base| base != remote.fingerprint());
                let resolution = Resolution {
                    value: None,
                    deletion: Some(pending.changed_at),
                    conflict: None,
                };
                if diverged {
                    resolution.with_conflict(conflict(
                        key.clone(),
                        pending.changed_at,
                        remote.updated_at(),
                        ConflictResolution::LocalWins,
                        remote.discarded(),
                        now,
                    ))
                } else {
                    resolution
                }
            } else {
                Resolution::keep(remote.clone(), Origin::Remote).with_conflict(conflict(
                    key.clone(),
                    pending.changed_at,
                    remote.updated_at(),
                    ConflictResolution::RemoteWins,
                    DiscardedVersion::Deletion {
                        deleted_at: pending.changed_at,
                    },
                    now,
                ))
            }
        }
        (ChangeKind::Deleted, _, None) => Resolution {
            value: None,
            deletion: remote_tombstone.is_none().then_some(pending.changed_at),
            conflict: None,
        },
    }
}

/// Accumulates the merged state while walking every key
struct Merger<'a> {
    local: &'a EntitySet,
    changes: &'a ChangeSet,
    remote: &'a SyncSnapshot,
    options: MergeOptions,
    notes: BTreeMap<NoteId, (Note, Origin)>,
    categories: BTreeMap<CategoryId, (Category, Origin)>,
    deletions: Vec<Tombstone>,
    conflicts: Vec<SyncConflict>,
    /// Category ids that were moved aside, with the side that owned them
    renames: Vec<(CategoryId, CategoryId, Origin)>,
}

impl<'a> Merger<'a> {
    fn new(
        local: &'a EntitySet,
        changes: &'a ChangeSet,
        remote: &'a SyncSnapshot,
        options: MergeOptions,
    ) -> Self {
        Self {
            local,
            changes,
            remote,
            options,
            notes: BTreeMap::new(),
            categories: BTreeMap::new(),
            deletions: Vec::new(),
            conflicts: Vec::new(),
            renames: Vec::new(),
        }
    }

    fn absorb<T>(&mut self, key: &EntityKey, resolution: Resolution<T>) -> Option<(T, Origin)> {
        if let Some(deleted_at) = resolution.deletion {
            self.deletions.push(Tombstone {
                key: key.clone(),
                deleted_at,
            });
        }
        if let Some(conflict) = resolution.conflict {
            tracing::warn!(
                entity = %conflict.key,
                resolution = conflict.resolution.as_str(),
                "Resolved sync conflict"
            );
            self.conflicts.push(conflict);
        }
        resolution.value
    }

    fn merge_categories(&mut self) {
        let (local_set, remote_set, changes) = (self.local, self.remote, self.changes);
        let category_keys = changes
            .keys()
            .filter_map(|key| match key {
                EntityKey::Category(id) => Some(id.clone()),
                EntityKey::Note(_) => None,
            })
            .collect::<Vec<_>>();
        let ids = local_set
            .categories
            .keys()
            .cloned()
            .chain(remote_set.categories.iter().map(|category| category.id.clone()))
            .chain(category_keys)
            .collect::<BTreeSet<_>>();

        let mut displaced = Vec::new();
        for id in ids {
            let key = EntityKey::Category(id.clone());
            let local = local_set.categories.get(&id);
            let remote = remote_set.category(&id);
            let pending = changes.get(&key);

            if let (Some(local), Some(remote), Some(pending)) = (local, remote, pending) {
                if pending.kind == ChangeKind::Created && local.created_at != remote.created_at {
                    // Two different categories that happen to share a name.
                    // The earlier one keeps the id.
                    tracing::debug!(category = %id, "Category id collision");
                    if local.created_at < remote.created_at {
                        self.categories
                            .insert(id.clone(), (local.clone(), Origin::Local));
                        displaced.push((remote.clone(), Origin::Remote));
                    } else {
                        self.categories
                            .insert(id.clone(), (remote.clone(), Origin::Remote));
                        displaced.push((local.clone(), Origin::Local));
                    }
                    continue;
                }
            }

            let resolution = resolve(
                &key,
                local,
                remote,
                pending,
                remote_set.tombstone(&key),
                self.options.now,
            );
            if let Some(value) = self.absorb(&key, resolution) {
                self.categories.insert(id, value);
            }
        }

        for (category, origin) in displaced {
            self.place_displaced(category, origin);
        }
    }

    /// Give a displaced category the first free `"<name> N"` id.
    ///
    /// If another replica already moved the same category (same creation
    /// time) to that id, the existing entry is reused.
    fn place_displaced(&mut self, category: Category, origin: Origin) {
        let (local, remote) = (self.local, self.remote);
        let original_id = category.id.clone();
        for suffix in 2u32.. {
            let name = format!("{} {suffix}", category.name);
            let Some(candidate) = CategoryId::from_name(&name) else {
                continue;
            };
            let taken = self
                .categories
                .get(&candidate)
                .map(|(existing, _)| existing)
                .or_else(|| remote.category(&candidate))
                .or_else(|| local.categories.get(&candidate))
                .cloned();

            match taken {
                Some(existing) if existing.created_at == category.created_at => {
                    self.categories
                        .entry(candidate.clone())
                        .or_insert((existing, origin));
                    self.renames.push((original_id, candidate, origin));
                    return;
                }
                Some(_) => {}
                None => {
                    let moved = Category {
                        id: candidate.clone(),
                        name,
                        ..category
                    };
                    self.categories.insert(candidate.clone(), (moved, origin));
                    self.renames.push((original_id, candidate, origin));
                    return;
                }
            }
        }
    }

    fn merge_notes(&mut self) {
        let (local_set, remote_set, changes) = (self.local, self.remote, self.changes);
        let note_keys = changes
            .keys()
            .filter_map(|key| match key {
                EntityKey::Note(id) => Some(*id),
                EntityKey::Category(_) => None,
            })
            .collect::<Vec<_>>();
        let ids = local_set
            .notes
            .keys()
            .copied()
            .chain(remote_set.notes.iter().map(|note| note.id))
            .chain(note_keys)
            .collect::<BTreeSet<_>>();

        for id in ids {
            let key = EntityKey::Note(id);
            let resolution = resolve(
                &key,
                local_set.notes.get(&id),
                remote_set.note(&id),
                changes.get(&key),
                remote_set.tombstone(&key),
                self.options.now,
            );
            if let Some(value) = self.absorb(&key, resolution) {
                self.notes.insert(id, value);
            }
        }
    }

    /// Point notes at renamed categories, then unassign dangling references
    fn repair_note_categories(&mut self) {
        for (old_id, new_id, side) in &self.renames {
            for (note, origin) in self.notes.values_mut() {
                if *origin == *side && note.category.as_ref() == Some(old_id) {
                    note.category = Some(new_id.clone());
                }
            }
        }
        for (note, _) in self.notes.values_mut() {
            if note
                .category
                .as_ref()
                .is_some_and(|id| !self.categories.contains_key(id))
            {
                note.category = None;
            }
        }
    }

    /// Keep exactly one scratchpad: the earliest created survives, later
    /// ones become ordinary notes. The survivor is never trashed, favorited
    /// or filed.
    fn normalize_scratchpads(&mut self) {
        let keeper = self
            .notes
            .values()
            .filter(|(note, _)| note.scratchpad)
            .min_by(|(a, _), (b, _)| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
            .map(|(note, _)| note.id);
        for (note, _) in self.notes.values_mut() {
            if !note.scratchpad {
                continue;
            }
            if Some(note.id) == keeper {
                note.trash = false;
                note.favorite = false;
                note.category = None;
            } else {
                note.scratchpad = false;
            }
        }
    }

    fn tombstones(&self) -> Vec<Tombstone> {
        let cutoff = self
            .options
            .now
            .saturating_sub(self.options.tombstone_retention_ms);
        let mut tombstones = self
            .remote
            .tombstones
            .iter()
            .chain(self.deletions.iter())
            .filter(|tombstone| tombstone.deleted_at >= cutoff)
            .filter(|tombstone| match &tombstone.key {
                EntityKey::Note(id) => !self.notes.contains_key(id),
                EntityKey::Category(id) => !self.categories.contains_key(id),
            })
            .cloned()
            .collect::<Vec<_>>();
        tombstones.sort_by(|a, b| a.key.cmp(&b.key).then(b.deleted_at.cmp(&a.deleted_at)));
        tombstones.dedup_by(|later, earlier| later.key == earlier.key);
        tombstones
    }

    fn finish(mut self) -> MergeOutcome {
        self.repair_note_categories();
        self.normalize_scratchpads();

        let tombstones = self.tombstones();
        let mut snapshot = SyncSnapshot {
            version: self.remote.version.saturating_add(1),
            written_at: self.options.now,
            notes: self.notes.values().map(|(note, _)| note.clone()).collect(),
            categories: self
                .categories
                .values()
                .map(|(category, _)| category.clone())
                .collect(),
            tombstones,
        };
        snapshot.normalize();

        let write_set = diff_keys(self.remote, &snapshot);

        let adopted = self
            .notes
            .values()
            .filter(|(note, origin)| {
                *origin == Origin::Remote && self.local.notes.get(&note.id) != Some(note)
            })
            .count()
            + self
                .categories
                .values()
                .filter(|(category, origin)| {
                    *origin == Origin::Remote
                        && self.local.categories.get(&category.id) != Some(category)
                })
                .count();
        let removed = self
            .local
            .notes
            .keys()
            .filter(|id| !self.notes.contains_key(id))
            .count()
            + self
                .local
                .categories
                .keys()
                .filter(|id| !self.categories.contains_key(id))
                .count();

        let entities = EntitySet {
            notes: self
                .notes
                .into_iter()
                .map(|(id, (note, _))| (id, note))
                .collect(),
            categories: self
                .categories
                .into_iter()
                .map(|(id, (category, _))| (id, category))
                .collect(),
        };

        MergeOutcome {
            entities,
            snapshot,
            write_set,
            conflicts: self.conflicts,
            adopted,
            removed,
        }
    }
}

/// Keys whose entity or tombstone differs between two snapshots.
///
/// Tombstones that merely aged out are not counted.
fn diff_keys(before: &SyncSnapshot, after: &SyncSnapshot) -> BTreeSet<EntityKey> {
    let mut keys = BTreeSet::new();

    for note in &after.notes {
        if before.note(&note.id) != Some(note) {
            keys.insert(EntityKey::Note(note.id));
        }
    }
    for note in &before.notes {
        if after.note(&note.id).is_none() {
            keys.insert(EntityKey::Note(note.id));
        }
    }
    for category in &after.categories {
        if before.category(&category.id) != Some(category) {
            keys.insert(EntityKey::Category(category.id.clone()));
        }
    }
    for category in &before.categories {
        if after.category(&category.id).is_none() {
            keys.insert(EntityKey::Category(category.id.clone()));
        }
    }
    for tombstone in &after.tombstones {
        if before.tombstone(&tombstone.key).is_none() {
            keys.insert(tombstone.key.clone());
        }
    }
    keys
}

/// Reconcile `local` + `changes` against `remote`
#[must_use]
pub fn merge(
    local: &EntitySet,
    changes: &ChangeSet,
    remote: &SyncSnapshot,
    options: MergeOptions,
) -> MergeOutcome {
    let mut merger = Merger::new(local, changes, remote, options);
    merger.merge_categories();
    merger.merge_notes();
    let outcome = merger.finish();
    tracing::debug!(
        remote_version = remote.version,
        write_set = outcome.write_set.len(),
        conflicts = outcome.conflicts.len(),
        adopted = outcome.adopted,
        removed = outcome.removed,
        "Merged local state with remote snapshot"
    );
    outcome
}

#[cfg(test)]
mod tests;
