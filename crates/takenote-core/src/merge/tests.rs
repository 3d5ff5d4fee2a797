use pretty_assertions::assert_eq;

use super::*;
use crate::store::ChangeTracker;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

fn options(now: i64) -> MergeOptions {
    MergeOptions {
        now,
        tombstone_retention_ms: 30 * DAY_MS,
    }
}

fn note(content: &str, at: i64) -> Note {
    Note::new(content, at)
}

fn category(name: &str, at: i64) -> Category {
    Category::new(name, 0, at).unwrap()
}

fn snapshot(version: u64, notes: Vec<Note>, categories: Vec<Category>) -> SyncSnapshot {
    let mut snapshot = SyncSnapshot {
        version,
        written_at: 0,
        notes,
        categories,
        tombstones: Vec::new(),
    };
    snapshot.normalize();
    snapshot
}

fn local(notes: &[Note], categories: &[Category]) -> EntitySet {
    EntitySet {
        notes: notes.iter().map(|note| (note.id, note.clone())).collect(),
        categories: categories
            .iter()
            .map(|category| (category.id.clone(), category.clone()))
            .collect(),
    }
}

#[test]
fn adopts_remote_only_note_without_push() {
    let remote_note = note("from another device", 10);
    let remote = snapshot(3, vec![remote_note.clone()], vec![]);

    let outcome = merge(&EntitySet::default(), &ChangeSet::default(), &remote, options(100));

    assert_eq!(outcome.entities.notes.get(&remote_note.id), Some(&remote_note));
    assert_eq!(outcome.adopted, 1);
    assert!(!outcome.needs_push());
    assert!(outcome.conflicts.is_empty());
}

#[test]
fn keeps_locally_created_note_for_push() {
    let created = note("hello", 10);
    let mut tracker = ChangeTracker::new();
    tracker.record(EntityKey::Note(created.id), ChangeKind::Created, None, 10);

    let outcome = merge(
        &local(&[created.clone()], &[]),
        &tracker.pending_changes(),
        &SyncSnapshot::empty(),
        options(100),
    );

    assert_eq!(outcome.snapshot.version, 1);
    assert_eq!(outcome.snapshot.notes, vec![created.clone()]);
    assert!(outcome.write_set.contains(&EntityKey::Note(created.id)));
}

#[test]
fn untouched_entity_prefers_remote_copy() {
    let mut ours = note("old text", 10);
    let mut theirs = ours.clone();
    theirs.content = "edited elsewhere".into();
    theirs.updated_at = 50;
    ours.updated_at = 60;

    let outcome = merge(
        &local(&[ours], &[]),
        &ChangeSet::default(),
        &snapshot(2, vec![theirs.clone()], vec![]),
        options(100),
    );

    assert_eq!(outcome.entities.notes.get(&theirs.id), Some(&theirs));
    assert!(outcome.conflicts.is_empty());
    assert!(!outcome.needs_push());
}

#[test]
fn untouched_local_note_missing_remotely_is_removed() {
    let stale = note("deleted elsewhere", 10);
    let outcome = merge(
        &local(&[stale.clone()], &[]),
        &ChangeSet::default(),
        &SyncSnapshot {
            version: 4,
            tombstones: vec![Tombstone {
                key: EntityKey::Note(stale.id),
                deleted_at: 90,
            }],
            ..SyncSnapshot::empty()
        },
        options(100),
    );

    assert!(outcome.entities.notes.is_empty());
    assert_eq!(outcome.removed, 1);
}

#[test]
fn local_trash_newer_than_unchanged_remote_stays_trashed() {
    // Synced at t=10, trashed locally at t=20; remote still holds t=10.
    let synced = note("hello", 10);
    let mut trashed = synced.clone();
    trashed.trash = true;
    trashed.updated_at = 20;

    let mut tracker = ChangeTracker::new();
    tracker.record(
        EntityKey::Note(synced.id),
        ChangeKind::Updated,
        Some(synced.fingerprint()),
        20,
    );

    let outcome = merge(
        &local(&[trashed.clone()], &[]),
        &tracker.pending_changes(),
        &snapshot(1, vec![synced], vec![]),
        options(100),
    );

    assert!(outcome.entities.notes[&trashed.id].trash);
    assert!(outcome.conflicts.is_empty());
    assert!(outcome.write_set.contains(&EntityKey::Note(trashed.id)));
}

#[test]
fn concurrent_edits_resolve_last_writer_wins_and_record_loser() {
    let base = note("base", 10);
    let mut ours = base.clone();
    ours.content = "ours".into();
    ours.updated_at = 30;
    let mut theirs = base.clone();
    theirs.content = "theirs".into();
    theirs.updated_at = 20;

    let mut tracker = ChangeTracker::new();
    tracker.record(
        EntityKey::Note(base.id),
        ChangeKind::Updated,
        Some(base.fingerprint()),
        30,
    );
    let changes = tracker.pending_changes();

    let outcome = merge(
        &local(&[ours.clone()], &[]),
        &changes,
        &snapshot(2, vec![theirs.clone()], vec![]),
        options(100),
    );
    assert_eq!(outcome.entities.notes[&base.id].content, "ours");
    assert_eq!(outcome.conflicts.len(), 1);
    let conflict = &outcome.conflicts[0];
    assert_eq!(conflict.resolution, ConflictResolution::LocalWins);
    assert_eq!(conflict.discarded, DiscardedVersion::Note(theirs.clone()));
    assert_eq!(conflict.resolved_at, 100);

    // Remote written later: remote wins, our edit is preserved in the record.
    theirs.updated_at = 40;
    let outcome = merge(
        &local(&[ours.clone()], &[]),
        &changes,
        &snapshot(2, vec![theirs.clone()], vec![]),
        options(100),
    );
    assert_eq!(outcome.entities.notes[&base.id].content, "theirs");
    assert_eq!(outcome.conflicts[0].resolution, ConflictResolution::RemoteWins);
    assert_eq!(outcome.conflicts[0].discarded, DiscardedVersion::Note(ours));
}

#[test]
fn timestamp_tie_goes_to_remote() {
    let base = note("base", 10);
    let mut ours = base.clone();
    ours.content = "ours".into();
    ours.updated_at = 30;
    let mut theirs = base.clone();
    theirs.content = "theirs".into();
    theirs.updated_at = 30;

    let mut tracker = ChangeTracker::new();
    tracker.record(
        EntityKey::Note(base.id),
        ChangeKind::Updated,
        Some(base.fingerprint()),
        30,
    );

    let outcome = merge(
        &local(&[ours], &[]),
        &tracker.pending_changes(),
        &snapshot(2, vec![theirs], vec![]),
        options(100),
    );
    assert_eq!(outcome.entities.notes[&base.id].content, "theirs");
    assert_eq!(outcome.conflicts[0].resolution, ConflictResolution::RemoteWins);
}

#[test]
fn newer_local_deletion_publishes_tombstone() {
    let synced = note("bye", 10);
    let mut tracker = ChangeTracker::new();
    tracker.record(
        EntityKey::Note(synced.id),
        ChangeKind::Deleted,
        Some(synced.fingerprint()),
        50,
    );

    let outcome = merge(
        &EntitySet::default(),
        &tracker.pending_changes(),
        &snapshot(1, vec![synced.clone()], vec![]),
        options(100),
    );

    assert!(outcome.entities.notes.is_empty());
    assert!(outcome.snapshot.notes.is_empty());
    assert_eq!(
        outcome.snapshot.tombstones,
        vec![Tombstone {
            key: EntityKey::Note(synced.id),
            deleted_at: 50,
        }]
    );
    assert!(outcome.conflicts.is_empty());
}

#[test]
fn remote_edit_newer_than_local_deletion_revives_note() {
    let synced = note("still needed", 10);
    let mut revived = synced.clone();
    revived.trash = false;
    revived.content = "restored and edited".into();
    revived.updated_at = 80;

    let mut tracker = ChangeTracker::new();
    tracker.record(
        EntityKey::Note(synced.id),
        ChangeKind::Deleted,
        Some(synced.fingerprint()),
        50,
    );

    let outcome = merge(
        &EntitySet::default(),
        &tracker.pending_changes(),
        &snapshot(2, vec![revived.clone()], vec![]),
        options(100),
    );

    assert_eq!(outcome.entities.notes.get(&synced.id), Some(&revived));
    assert!(outcome.snapshot.tombstones.is_empty());
    assert_eq!(
        outcome.conflicts[0].discarded,
        DiscardedVersion::Deletion { deleted_at: 50 }
    );
}

#[test]
fn local_edit_against_remote_tombstone() {
    let synced = note("contested", 10);
    let mut edited = synced.clone();
    edited.content = "edited".into();
    edited.updated_at = 70;
    let mut tracker = ChangeTracker::new();
    tracker.record(
        EntityKey::Note(synced.id),
        ChangeKind::Updated,
        Some(synced.fingerprint()),
        70,
    );
    let tombstoned = |deleted_at| SyncSnapshot {
        version: 5,
        tombstones: vec![Tombstone {
            key: EntityKey::Note(synced.id),
            deleted_at,
        }],
        ..SyncSnapshot::empty()
    };

    // Edit after the deletion: the note comes back.
    let outcome = merge(
        &local(&[edited.clone()], &[]),
        &tracker.pending_changes(),
        &tombstoned(60),
        options(100),
    );
    assert_eq!(outcome.entities.notes.get(&synced.id), Some(&edited));
    assert!(outcome.snapshot.tombstones.is_empty());
    assert_eq!(outcome.conflicts[0].resolution, ConflictResolution::LocalWins);

    // Edit before the deletion: the deletion stands, our copy is recorded.
    let outcome = merge(
        &local(&[edited.clone()], &[]),
        &tracker.pending_changes(),
        &tombstoned(90),
        options(100),
    );
    assert!(outcome.entities.notes.is_empty());
    assert_eq!(outcome.conflicts[0].discarded, DiscardedVersion::Note(edited));
}

#[test]
fn same_name_categories_from_two_replicas_both_survive() {
    let remote_work = category("Work", 10);
    let local_work = category("Work", 20);

    let mut filed = note("standup notes", 21);
    filed.category = Some(local_work.id.clone());
    let mut remote_filed = note("q3 plan", 11);
    remote_filed.category = Some(remote_work.id.clone());

    let mut tracker = ChangeTracker::new();
    tracker.record(
        EntityKey::Category(local_work.id.clone()),
        ChangeKind::Created,
        None,
        20,
    );
    tracker.record(EntityKey::Note(filed.id), ChangeKind::Created, None, 21);

    let outcome = merge(
        &local(&[filed.clone()], &[local_work]),
        &tracker.pending_changes(),
        &snapshot(3, vec![remote_filed.clone()], vec![remote_work.clone()]),
        options(100),
    );

    let work = CategoryId::from_raw("work");
    let work_2 = CategoryId::from_raw("work-2");
    assert_eq!(outcome.entities.categories[&work], remote_work);
    let moved = &outcome.entities.categories[&work_2];
    assert_eq!(moved.name, "Work 2");
    assert_eq!(moved.created_at, 20);

    assert_eq!(outcome.entities.notes[&filed.id].category, Some(work_2));
    assert_eq!(outcome.entities.notes[&remote_filed.id].category, Some(work));
}

#[test]
fn earlier_local_category_keeps_id_and_remote_one_moves() {
    let local_work = category("Work", 5);
    let remote_work = category("Work", 10);
    let mut remote_filed = note("remote", 11);
    remote_filed.category = Some(remote_work.id.clone());

    let mut tracker = ChangeTracker::new();
    tracker.record(
        EntityKey::Category(local_work.id.clone()),
        ChangeKind::Created,
        None,
        5,
    );

    let outcome = merge(
        &local(&[], &[local_work.clone()]),
        &tracker.pending_changes(),
        &snapshot(3, vec![remote_filed.clone()], vec![remote_work]),
        options(100),
    );

    assert_eq!(
        outcome.entities.categories[&local_work.id].created_at,
        local_work.created_at
    );
    assert_eq!(
        outcome.entities.notes[&remote_filed.id].category,
        Some(CategoryId::from_raw("work-2"))
    );
    assert!(outcome
        .write_set
        .contains(&EntityKey::Category(CategoryId::from_raw("work-2"))));
}

#[test]
fn category_already_moved_by_other_replica_is_reused() {
    // The other replica already published our category as "Work 2".
    let remote_work = category("Work", 10);
    let local_work = category("Work", 20);
    let mut already_moved = local_work.clone();
    already_moved.id = CategoryId::from_raw("work-2");
    already_moved.name = "Work 2".into();

    let mut tracker = ChangeTracker::new();
    tracker.record(
        EntityKey::Category(local_work.id.clone()),
        ChangeKind::Created,
        None,
        20,
    );

    let outcome = merge(
        &local(&[], &[local_work]),
        &tracker.pending_changes(),
        &snapshot(4, vec![], vec![remote_work, already_moved]),
        options(100),
    );

    assert_eq!(outcome.entities.categories.len(), 2);
    assert!(!outcome.needs_push());
}

#[test]
fn remotely_deleted_category_unassigns_notes() {
    let work = category("Work", 10);
    let mut filed = note("filed", 11);
    filed.category = Some(work.id.clone());

    let mut tracker = ChangeTracker::new();
    tracker.record(EntityKey::Note(filed.id), ChangeKind::Created, None, 11);

    let outcome = merge(
        &local(&[filed.clone()], &[work.clone()]),
        &tracker.pending_changes(),
        &SyncSnapshot {
            version: 2,
            tombstones: vec![Tombstone {
                key: EntityKey::Category(work.id),
                deleted_at: 50,
            }],
            ..SyncSnapshot::empty()
        },
        options(100),
    );

    assert!(outcome.entities.categories.is_empty());
    assert_eq!(outcome.entities.notes[&filed.id].category, None);
}

#[test]
fn only_one_scratchpad_survives() {
    let ours = Note::scratchpad(20);
    let theirs = Note::scratchpad(10);
    let mut tracker = ChangeTracker::new();
    tracker.record(EntityKey::Note(ours.id), ChangeKind::Created, None, 20);

    let outcome = merge(
        &local(&[ours.clone()], &[]),
        &tracker.pending_changes(),
        &snapshot(1, vec![theirs.clone()], vec![]),
        options(100),
    );

    assert!(outcome.entities.notes[&theirs.id].scratchpad);
    assert!(!outcome.entities.notes[&ours.id].scratchpad);
}

#[test]
fn kept_scratchpad_is_never_trashed_favorited_or_filed() {
    let work = category("Work", 5);
    let mut broken = Note::scratchpad(10);
    broken.trash = true;
    broken.favorite = true;
    broken.category = Some(work.id.clone());

    let outcome = merge(
        &EntitySet::default(),
        &ChangeSet::default(),
        &snapshot(1, vec![broken.clone()], vec![work]),
        options(100),
    );

    let kept = &outcome.entities.notes[&broken.id];
    assert!(kept.scratchpad);
    assert!(!kept.trash);
    assert!(!kept.favorite);
    assert_eq!(kept.category, None);
    assert!(outcome.write_set.contains(&EntityKey::Note(broken.id)));
}

#[test]
fn expired_tombstones_are_dropped() {
    let now = 100 * DAY_MS;
    let old = Tombstone {
        key: EntityKey::Note(NoteId::new()),
        deleted_at: now - 31 * DAY_MS,
    };
    let recent = Tombstone {
        key: EntityKey::Note(NoteId::new()),
        deleted_at: now - DAY_MS,
    };
    let remote = SyncSnapshot {
        version: 9,
        tombstones: vec![old, recent.clone()],
        ..SyncSnapshot::empty()
    };

    let outcome = merge(&EntitySet::default(), &ChangeSet::default(), &remote, options(now));

    assert_eq!(outcome.snapshot.tombstones, vec![recent]);
    assert!(!outcome.needs_push());
}

#[test]
fn merge_is_idempotent() {
    let base = note("base", 10);
    let mut ours = base.clone();
    ours.content = "ours".into();
    ours.updated_at = 30;
    let mut theirs = base.clone();
    theirs.content = "theirs".into();
    theirs.updated_at = 20;
    let fresh = note("new locally", 25);
    let remote_only = note("remote only", 5);

    let mut tracker = ChangeTracker::new();
    tracker.record(
        EntityKey::Note(base.id),
        ChangeKind::Updated,
        Some(base.fingerprint()),
        30,
    );
    tracker.record(EntityKey::Note(fresh.id), ChangeKind::Created, None, 25);
    let changes = tracker.pending_changes();

    let first = merge(
        &local(&[ours, fresh], &[]),
        &changes,
        &snapshot(2, vec![theirs, remote_only], vec![]),
        options(100),
    );
    assert_eq!(first.conflicts.len(), 1);

    // Same pending changes against the snapshot the first merge produced.
    let second = merge(&first.entities, &changes, &first.snapshot, options(200));
    assert_eq!(second.entities, first.entities);
    assert!(second.conflicts.is_empty());
    assert!(!second.needs_push());

    // After the changes are acknowledged nothing moves either.
    let third = merge(&first.entities, &ChangeSet::default(), &first.snapshot, options(300));
    assert_eq!(third.entities, first.entities);
    assert!(third.conflicts.is_empty());
    assert!(!third.needs_push());
}
