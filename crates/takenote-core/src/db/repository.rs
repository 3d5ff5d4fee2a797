//! Local repository: persists the entity store, conflict log and sync
//! bookkeeping

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Error, Result};
use crate::models::{
    Category, CategoryId, ConflictResolution, EntityKey, Note, NoteId, SyncConflict,
};
use crate::store::{ChangeKind, ChangeTracker, EntitySet, EntityStore, PendingChange};
use crate::sync::SyncReport;

const META_LAST_SYNCED_AT: &str = "last_synced_at";
const META_REMOTE_VERSION: &str = "remote_version";

/// Bookkeeping from the last successful sync
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncMeta {
    pub last_synced_at: Option<i64>,
    pub remote_version: Option<u64>,
}

/// Trait for local persistence operations
pub trait LocalRepository {
    /// Load the store; a fresh database yields a store with only the scratchpad
    fn load_store(&self) -> Result<EntityStore>;

    /// Replace everything persisted with the store's current state
    fn save_store(&self, store: &EntityStore) -> Result<()>;

    /// Append resolved conflicts to the log
    fn record_conflicts(&self, conflicts: &[SyncConflict]) -> Result<()>;

    /// Most recent conflicts first
    fn list_conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>>;

    /// Persist the outcome of a successful sync
    fn record_sync(&self, report: &SyncReport) -> Result<()>;

    fn sync_meta(&self) -> Result<SyncMeta>;
}

/// `SQLite` implementation of `LocalRepository`
pub struct SqliteLocalRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteLocalRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn load_notes(&self) -> Result<Vec<Note>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, content, category, favorite, trash, scratchpad, created_at, updated_at
             FROM notes",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    Note {
                        id: NoteId::default(),
                        content: row.get(1)?,
                        category: row.get::<_, Option<String>>(2)?.map(CategoryId::from_raw),
                        favorite: row.get::<_, i32>(3)? != 0,
                        trash: row.get::<_, i32>(4)? != 0,
                        scratchpad: row.get::<_, i32>(5)? != 0,
                        created_at: row.get(6)?,
                        updated_at: row.get(7)?,
                    },
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(id, note)| {
                Ok(Note {
                    id: parse_note_id(&id)?,
                    ..note
                })
            })
            .collect()
    }

    fn load_categories(&self) -> Result<Vec<Category>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, position, created_at, updated_at FROM categories ORDER BY position",
        )?;
        let categories = stmt
            .query_map([], |row| {
                Ok(Category {
                    id: CategoryId::from_raw(row.get::<_, String>(0)?),
                    name: row.get(1)?,
                    position: row.get(2)?,
                    created_at: row.get(3)?,
                    updated_at: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(categories)
    }

    fn load_pending(&self) -> Result<Vec<(EntityKey, PendingChange)>> {
        let mut stmt = self.conn.prepare(
            "SELECT entity_kind, entity_id, kind, changed_at, seq, base FROM pending_changes",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, Option<String>>(5)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(entity_kind, entity_id, kind, changed_at, seq, base)| {
                let key = parse_key(&entity_kind, &entity_id)?;
                let kind = ChangeKind::parse(&kind)
                    .ok_or_else(|| Error::Database(format!("unknown change kind '{kind}'")))?;
                let seq = u64::try_from(seq)
                    .map_err(|_| Error::Database(format!("negative change sequence {seq}")))?;
                Ok((
                    key,
                    PendingChange {
                        kind,
                        changed_at,
                        seq,
                        base,
                    },
                ))
            })
            .collect()
    }

    fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM sync_meta WHERE key = ?",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO sync_meta (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }
}

impl LocalRepository for SqliteLocalRepository<'_> {
    fn load_store(&self) -> Result<EntityStore> {
        let notes = self.load_notes()?;
        let categories = self.load_categories()?;
        let pending = self.load_pending()?;
        let remote_version = self.sync_meta()?.remote_version;

        if notes.is_empty() && categories.is_empty() && pending.is_empty() {
            tracing::debug!("Local database is empty, starting a fresh store");
            return Ok(EntityStore::new().with_remote_version(remote_version));
        }

        let entities = EntitySet {
            notes: notes.into_iter().map(|note| (note.id, note)).collect(),
            categories: categories
                .into_iter()
                .map(|category| (category.id.clone(), category))
                .collect(),
        };
        Ok(
            EntityStore::from_parts(entities, ChangeTracker::from_entries(pending))
                .with_remote_version(remote_version),
        )
    }

    fn save_store(&self, store: &EntityStore) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute_batch(
            "DELETE FROM notes;
             DELETE FROM categories;
             DELETE FROM pending_changes;",
        )?;

        {
            let mut insert_note = tx.prepare(
                "INSERT INTO notes
                    (id, content, category, favorite, trash, scratchpad, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )?;
            for note in store.entities().notes.values() {
                insert_note.execute(params![
                    note.id.as_str(),
                    note.content,
                    note.category.as_ref().map(CategoryId::as_str),
                    i32::from(note.favorite),
                    i32::from(note.trash),
                    i32::from(note.scratchpad),
                    note.created_at,
                    note.updated_at,
                ])?;
            }

            let mut insert_category = tx.prepare(
                "INSERT INTO categories (id, name, position, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?)",
            )?;
            for category in store.entities().categories.values() {
                insert_category.execute(params![
                    category.id.as_str(),
                    category.name,
                    category.position,
                    category.created_at,
                    category.updated_at,
                ])?;
            }

            let mut insert_change = tx.prepare(
                "INSERT INTO pending_changes (entity_kind, entity_id, kind, changed_at, seq, base)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )?;
            for (key, change) in store.pending_changes().iter() {
                let (entity_kind, entity_id) = key_parts(key);
                let seq = i64::try_from(change.seq)
                    .map_err(|_| Error::Database(format!("change sequence {} overflows", change.seq)))?;
                insert_change.execute(params![
                    entity_kind,
                    entity_id,
                    change.kind.as_str(),
                    change.changed_at,
                    seq,
                    change.base,
                ])?;
            }
        }

        tx.commit()?;
        tracing::debug!(
            notes = store.entities().notes.len(),
            categories = store.entities().categories.len(),
            pending = store.pending_changes().len(),
            "Saved local store"
        );
        Ok(())
    }

    fn record_conflicts(&self, conflicts: &[SyncConflict]) -> Result<()> {
        if conflicts.is_empty() {
            return Ok(());
        }
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO sync_conflicts (
                    entity_kind, entity_id, local_updated_at, remote_updated_at,
                    resolution, discarded, resolved_at, strategy
                 ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )?;
            for conflict in conflicts {
                let (entity_kind, entity_id) = key_parts(&conflict.key);
                insert.execute(params![
                    entity_kind,
                    entity_id,
                    conflict.local_updated_at,
                    conflict.remote_updated_at,
                    conflict.resolution.as_str(),
                    serde_json::to_string(&conflict.discarded)?,
                    conflict.resolved_at,
                    conflict.strategy(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    #[allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT
    fn list_conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>> {
        let mut stmt = self.conn.prepare(
            "SELECT entity_kind, entity_id, local_updated_at, remote_updated_at,
                    resolution, discarded, resolved_at
             FROM sync_conflicts
             ORDER BY resolved_at DESC, id DESC
             LIMIT ?",
        )?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, i64>(6)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(
                |(entity_kind, entity_id, local_updated_at, remote_updated_at, resolution, discarded, resolved_at)| {
                    Ok(SyncConflict {
                        key: parse_key(&entity_kind, &entity_id)?,
                        local_updated_at,
                        remote_updated_at,
                        resolution: parse_resolution(&resolution)?,
                        discarded: serde_json::from_str(&discarded)?,
                        resolved_at,
                    })
                },
            )
            .collect()
    }

    fn record_sync(&self, report: &SyncReport) -> Result<()> {
        self.set_meta(META_LAST_SYNCED_AT, &report.finished_at.to_string())?;
        self.set_meta(META_REMOTE_VERSION, &report.remote_version.to_string())?;
        self.record_conflicts(&report.conflicts)
    }

    fn sync_meta(&self) -> Result<SyncMeta> {
        let last_synced_at = self
            .get_meta(META_LAST_SYNCED_AT)?
            .map(|value| parse_meta(META_LAST_SYNCED_AT, &value))
            .transpose()?;
        let remote_version = self
            .get_meta(META_REMOTE_VERSION)?
            .map(|value| parse_meta(META_REMOTE_VERSION, &value))
            .transpose()?;
        Ok(SyncMeta {
            last_synced_at,
            remote_version,
        })
    }
}

fn key_parts(key: &EntityKey) -> (&'static str, String) {
    match key {
        EntityKey::Note(id) => ("note", id.as_str()),
        EntityKey::Category(id) => ("category", id.as_str().to_string()),
    }
}

fn parse_key(entity_kind: &str, entity_id: &str) -> Result<EntityKey> {
    match entity_kind {
        "note" => Ok(EntityKey::Note(parse_note_id(entity_id)?)),
        "category" => Ok(EntityKey::Category(CategoryId::from_raw(entity_id))),
        other => Err(Error::Database(format!("unknown entity kind '{other}'"))),
    }
}

fn parse_note_id(raw: &str) -> Result<NoteId> {
    raw.parse()
        .map_err(|_| Error::Database(format!("invalid note id '{raw}'")))
}

fn parse_resolution(raw: &str) -> Result<ConflictResolution> {
    match raw {
        "local_wins" => Ok(ConflictResolution::LocalWins),
        "remote_wins" => Ok(ConflictResolution::RemoteWins),
        other => Err(Error::Database(format!("unknown conflict resolution '{other}'"))),
    }
}

fn parse_meta<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::Database(format!("invalid {key} value '{value}'")))
}
