//! In-memory entity store: the single owner of notes, categories and
//! their pending changes.
//!
//! Every edit goes through [`EntityStore::apply`], which validates the
//! [`Mutation`], updates the entities, and records the net change in the
//! [`ChangeTracker`].

mod tracker;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use tracker::{ChangeKind, ChangeSet, ChangeTracker, PendingChange};

use crate::error::{Error, Result};
use crate::models::{Category, CategoryId, EntityKey, Note, NoteId};
use crate::util::unix_millis_now;

/// A user-level edit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    CreateNote {
        content: String,
        category: Option<CategoryId>,
    },
    UpdateNoteContent {
        id: NoteId,
        content: String,
    },
    ToggleFavorite {
        id: NoteId,
    },
    ToggleTrash {
        id: NoteId,
    },
    RestoreNote {
        id: NoteId,
    },
    DeleteNotePermanently {
        id: NoteId,
    },
    EmptyTrash,
    AddCategory {
        name: String,
    },
    RenameCategory {
        id: CategoryId,
        name: String,
    },
    DeleteCategory {
        id: CategoryId,
    },
    MoveNoteToCategory {
        id: NoteId,
        category: Option<CategoryId>,
    },
    /// Move the category at index `from` (sidebar order) to index `to`
    ReorderCategories {
        from: usize,
        to: usize,
    },
}

/// Entities touched by one applied mutation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Applied {
    pub touched: Vec<EntityKey>,
}

impl Applied {
    /// First note touched, e.g. the id of a created note
    #[must_use]
    pub fn note_id(&self) -> Option<NoteId> {
        self.touched.iter().find_map(|key| match key {
            EntityKey::Note(id) => Some(*id),
            EntityKey::Category(_) => None,
        })
    }

    /// First category touched
    #[must_use]
    pub fn category_id(&self) -> Option<CategoryId> {
        self.touched.iter().find_map(|key| match key {
            EntityKey::Category(id) => Some(id.clone()),
            EntityKey::Note(_) => None,
        })
    }

    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.touched.is_empty()
    }
}

/// Plain copy of every entity, handed to the merge engine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntitySet {
    pub notes: BTreeMap<NoteId, Note>,
    pub categories: BTreeMap<CategoryId, Category>,
}

/// Which notes a view shows
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteFilter {
    /// Every note that is neither trashed nor the scratchpad
    All,
    Favorites,
    Trash,
    Category(CategoryId),
    Scratchpad,
}

/// Note list ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotesSortKey {
    #[default]
    LastUpdated,
    Title,
    CreatedDate,
}

/// Notes, categories and the change tracker, kept consistent together
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityStore {
    entities: EntitySet,
    tracker: ChangeTracker,
    /// Remote version this store last merged with; `None` until the first
    /// successful sync
    remote_version: Option<u64>,
}

impl EntityStore {
    /// Create a store holding only a fresh scratchpad note
    #[must_use]
    pub fn new() -> Self {
        Self::new_at(unix_millis_now())
    }

    #[must_use]
    pub fn new_at(now: i64) -> Self {
        let mut store = Self {
            entities: EntitySet::default(),
            tracker: ChangeTracker::new(),
            remote_version: None,
        };
        store.ensure_scratchpad(now);
        store
    }

    /// Rebuild a store from persisted parts
    #[must_use]
    pub fn from_parts(entities: EntitySet, tracker: ChangeTracker) -> Self {
        Self {
            entities,
            tracker,
            remote_version: None,
        }
    }

    /// Restore the remote version recorded by the last successful sync
    #[must_use]
    pub const fn with_remote_version(mut self, remote_version: Option<u64>) -> Self {
        self.remote_version = remote_version;
        self
    }

    #[must_use]
    pub const fn remote_version(&self) -> Option<u64> {
        self.remote_version
    }

    #[must_use]
    pub const fn entities(&self) -> &EntitySet {
        &self.entities
    }

    #[must_use]
    pub const fn tracker(&self) -> &ChangeTracker {
        &self.tracker
    }

    /// All notes and categories, categories in sidebar order
    #[must_use]
    pub fn get_all(&self) -> (Vec<&Note>, Vec<&Category>) {
        (self.notes(), self.categories())
    }

    /// Every note, trashed ones and the scratchpad included
    #[must_use]
    pub fn notes(&self) -> Vec<&Note> {
        self.entities.notes.values().collect()
    }

    #[must_use]
    pub fn note(&self, id: &NoteId) -> Option<&Note> {
        self.entities.notes.get(id)
    }

    #[must_use]
    pub fn category(&self, id: &CategoryId) -> Option<&Category> {
        self.entities.categories.get(id)
    }

    /// Categories in sidebar order
    #[must_use]
    pub fn categories(&self) -> Vec<&Category> {
        let mut categories = self.entities.categories.values().collect::<Vec<_>>();
        categories.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.id.cmp(&b.id)));
        categories
    }

    #[must_use]
    pub fn scratchpad(&self) -> Option<&Note> {
        self.entities.notes.values().find(|note| note.scratchpad)
    }

    #[must_use]
    pub fn pending_changes(&self) -> ChangeSet {
        self.tracker.pending_changes()
    }

    /// Notes matching `filter`, ordered by `sort`
    #[must_use]
    pub fn notes_view(&self, filter: &NoteFilter, sort: NotesSortKey) -> Vec<&Note> {
        let mut notes = self
            .entities
            .notes
            .values()
            .filter(|note| match filter {
                NoteFilter::All => !note.trash && !note.scratchpad,
                NoteFilter::Favorites => note.favorite && !note.trash,
                NoteFilter::Trash => note.trash,
                NoteFilter::Category(id) => !note.trash && note.category.as_ref() == Some(id),
                NoteFilter::Scratchpad => note.scratchpad,
            })
            .collect::<Vec<_>>();

        match sort {
            NotesSortKey::LastUpdated => notes.sort_by(|a, b| b.updated_at.cmp(&a.updated_at)),
            NotesSortKey::CreatedDate => notes.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            NotesSortKey::Title => notes.sort_by_cached_key(|note| note.title().to_lowercase()),
        }
        notes
    }

    /// Resolve a full note id or a unique id prefix
    pub fn resolve_note(&self, query: &str) -> Result<NoteId> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::validation("note id cannot be empty"));
        }
        if let Ok(id) = query.parse::<NoteId>() {
            if self.entities.notes.contains_key(&id) {
                return Ok(id);
            }
        }

        let matches = self
            .entities
            .notes
            .keys()
            .filter(|id| id.as_str().starts_with(query))
            .take(3)
            .collect::<Vec<_>>();

        match matches.as_slice() {
            [] => Err(Error::NotFound(format!("note {query}"))),
            [id] => Ok(**id),
            _ => {
                let options = matches
                    .iter()
                    .map(|id| id.short())
                    .collect::<Vec<_>>()
                    .join(", ");
                Err(Error::validation(format!(
                    "note id prefix '{query}' is ambiguous; matches: {options}"
                )))
            }
        }
    }

    /// Apply a mutation stamped with the current time
    pub fn apply(&mut self, mutation: Mutation) -> Result<Applied> {
        self.apply_at(mutation, unix_millis_now())
    }

    /// Apply a mutation stamped with `now` (Unix ms)
    pub fn apply_at(&mut self, mutation: Mutation, now: i64) -> Result<Applied> {
        tracing::debug!(?mutation, "Applying mutation");
        match mutation {
            Mutation::CreateNote { content, category } => self.create_note(content, category, now),
            Mutation::UpdateNoteContent { id, content } => {
                self.edit_note(id, now, |note| {
                    if note.content == content {
                        return Ok(false);
                    }
                    note.content = content;
                    Ok(true)
                })
            }
            Mutation::ToggleFavorite { id } => self.edit_note(id, now, |note| {
                if note.scratchpad {
                    return Err(Error::validation("the scratchpad cannot be favorited"));
                }
                note.favorite = !note.favorite;
                Ok(true)
            }),
            Mutation::ToggleTrash { id } => self.edit_note(id, now, |note| {
                if note.scratchpad {
                    return Err(Error::validation("the scratchpad cannot be trashed"));
                }
                note.trash = !note.trash;
                Ok(true)
            }),
            Mutation::RestoreNote { id } => self.edit_note(id, now, |note| {
                let was_trashed = note.trash;
                note.trash = false;
                Ok(was_trashed)
            }),
            Mutation::DeleteNotePermanently { id } => self.delete_note(id, now),
            Mutation::EmptyTrash => self.empty_trash(now),
            Mutation::AddCategory { name } => self.add_category(&name, now),
            Mutation::RenameCategory { id, name } => self.rename_category(&id, &name, now),
            Mutation::DeleteCategory { id } => Ok(self.delete_category(&id, now)),
            Mutation::MoveNoteToCategory { id, category } => {
                if let Some(category) = &category {
                    self.require_category(category)?;
                }
                self.edit_note(id, now, |note| {
                    if note.scratchpad {
                        return Err(Error::validation(
                            "the scratchpad cannot be moved to a category",
                        ));
                    }
                    if note.category == category {
                        return Ok(false);
                    }
                    note.category = category;
                    Ok(true)
                })
            }
            Mutation::ReorderCategories { from, to } => self.reorder_categories(from, to, now),
        }
    }

    fn create_note(
        &mut self,
        content: String,
        category: Option<CategoryId>,
        now: i64,
    ) -> Result<Applied> {
        if let Some(category) = &category {
            self.require_category(category)?;
        }
        let mut note = Note::new(content, now);
        note.category = category;
        let key = EntityKey::Note(note.id);
        self.tracker
            .record(key.clone(), ChangeKind::Created, None, now);
        self.entities.notes.insert(note.id, note);
        Ok(Applied { touched: vec![key] })
    }

    /// Run `edit` against a copy of the note; commit and record only when it
    /// reports a change.
    fn edit_note(
        &mut self,
        id: NoteId,
        now: i64,
        edit: impl FnOnce(&mut Note) -> Result<bool>,
    ) -> Result<Applied> {
        let current = self
            .entities
            .notes
            .get(&id)
            .ok_or_else(|| Error::validation(format!("unknown note {id}")))?;
        let mut next = current.clone();
        if !edit(&mut next)? {
            return Ok(Applied::default());
        }

        let base = current.fingerprint();
        next.updated_at = now;
        let key = EntityKey::Note(id);
        self.tracker
            .record(key.clone(), ChangeKind::Updated, Some(base), now);
        self.entities.notes.insert(id, next);
        Ok(Applied { touched: vec![key] })
    }

    fn delete_note(&mut self, id: NoteId, now: i64) -> Result<Applied> {
        let Some(note) = self.entities.notes.get(&id) else {
            return Ok(Applied::default());
        };
        if !note.trash {
            return Err(Error::validation(format!(
                "note {} must be in the trash before it can be deleted",
                id.short()
            )));
        }
        let base = note.fingerprint();
        self.entities.notes.remove(&id);
        let key = EntityKey::Note(id);
        self.tracker
            .record(key.clone(), ChangeKind::Deleted, Some(base), now);
        Ok(Applied { touched: vec![key] })
    }

    fn empty_trash(&mut self, now: i64) -> Result<Applied> {
        let trashed = self
            .entities
            .notes
            .values()
            .filter(|note| note.trash)
            .map(|note| note.id)
            .collect::<Vec<_>>();

        let mut applied = Applied::default();
        for id in trashed {
            applied.touched.extend(self.delete_note(id, now)?.touched);
        }
        Ok(applied)
    }

    fn add_category(&mut self, name: &str, now: i64) -> Result<Applied> {
        let position = self
            .entities
            .categories
            .values()
            .map(|category| category.position.saturating_add(1))
            .max()
            .unwrap_or(0);
        let category = Category::new(name, position, now).ok_or_else(|| {
            Error::validation(format!("category name '{}' is empty", name.trim()))
        })?;
        if self.entities.categories.contains_key(&category.id) {
            return Err(Error::validation(format!(
                "category '{}' already exists",
                category.id
            )));
        }

        let key = EntityKey::Category(category.id.clone());
        self.tracker
            .record(key.clone(), ChangeKind::Created, None, now);
        self.entities
            .categories
            .insert(category.id.clone(), category);
        Ok(Applied { touched: vec![key] })
    }

    /// Renaming keeps the id, so notes never need re-pointing
    fn rename_category(&mut self, id: &CategoryId, name: &str, now: i64) -> Result<Applied> {
        let name = name.trim();
        if CategoryId::from_name(name).is_none() {
            return Err(Error::validation(format!("category name '{name}' is empty")));
        }
        let current = self.require_category(id)?;
        if current.name == name {
            return Ok(Applied::default());
        }

        let base = current.fingerprint();
        let mut next = current.clone();
        next.name = name.to_string();
        next.updated_at = now;
        let key = EntityKey::Category(id.clone());
        self.tracker
            .record(key.clone(), ChangeKind::Updated, Some(base), now);
        self.entities.categories.insert(id.clone(), next);
        Ok(Applied { touched: vec![key] })
    }

    fn delete_category(&mut self, id: &CategoryId, now: i64) -> Applied {
        let Some(category) = self.entities.categories.remove(id) else {
            return Applied::default();
        };
        let key = EntityKey::Category(id.clone());
        self.tracker.record(
            key.clone(),
            ChangeKind::Deleted,
            Some(category.fingerprint()),
            now,
        );

        let mut applied = Applied { touched: vec![key] };
        applied.touched.extend(self.prune_dangling_categories(now));
        applied
    }

    fn reorder_categories(&mut self, from: usize, to: usize, now: i64) -> Result<Applied> {
        let mut ordered = self
            .categories()
            .into_iter()
            .map(|category| category.id.clone())
            .collect::<Vec<_>>();
        if from >= ordered.len() || to >= ordered.len() {
            return Err(Error::validation(format!(
                "category index out of range (have {})",
                ordered.len()
            )));
        }
        let moved = ordered.remove(from);
        ordered.insert(to, moved);

        let mut applied = Applied::default();
        for (index, id) in ordered.into_iter().enumerate() {
            let position = u32::try_from(index).unwrap_or(u32::MAX);
            let Some(category) = self.entities.categories.get_mut(&id) else {
                continue;
            };
            if category.position == position {
                continue;
            }
            let base = category.fingerprint();
            category.position = position;
            category.updated_at = now;
            let key = EntityKey::Category(id);
            self.tracker
                .record(key.clone(), ChangeKind::Updated, Some(base), now);
            applied.touched.push(key);
        }
        Ok(applied)
    }

    fn require_category(&self, id: &CategoryId) -> Result<&Category> {
        self.entities
            .categories
            .get(id)
            .ok_or_else(|| Error::validation(format!("unknown category {id}")))
    }

    /// Unassign every note that points at a missing category
    fn prune_dangling_categories(&mut self, now: i64) -> Vec<EntityKey> {
        let dangling = self
            .entities
            .notes
            .values()
            .filter(|note| {
                note.category
                    .as_ref()
                    .is_some_and(|id| !self.entities.categories.contains_key(id))
            })
            .map(|note| note.id)
            .collect::<Vec<_>>();

        let mut touched = Vec::with_capacity(dangling.len());
        for id in dangling {
            let Some(note) = self.entities.notes.get_mut(&id) else {
                continue;
            };
            let base = note.fingerprint();
            note.category = None;
            note.updated_at = now;
            let key = EntityKey::Note(id);
            self.tracker
                .record(key.clone(), ChangeKind::Updated, Some(base), now);
            touched.push(key);
        }
        touched
    }

    fn ensure_scratchpad(&mut self, now: i64) {
        if self.scratchpad().is_some() {
            return;
        }
        let note = Note::scratchpad(now);
        self.tracker
            .record(EntityKey::Note(note.id), ChangeKind::Created, None, now);
        self.entities.notes.insert(note.id, note);
    }

    /// Copy the entities and pending changes for a sync, marking the
    /// changes in flight
    pub(crate) fn capture(&mut self) -> (EntitySet, ChangeSet) {
        (self.entities.clone(), self.tracker.begin_capture())
    }

    pub(crate) fn abort_capture(&mut self) {
        self.tracker.abort_capture();
    }

    /// Install a merge result.
    ///
    /// Entities edited after `captured` was taken keep their local version
    /// and stay pending; everything else takes the merged version.
    pub(crate) fn commit_merge(
        &mut self,
        merged: EntitySet,
        captured: &ChangeSet,
        pushed: &BTreeMap<EntityKey, String>,
        remote_version: u64,
        now: i64,
    ) {
        let mut notes = merged.notes;
        for (id, local) in &self.entities.notes {
            if self.tracker.touched_since(&EntityKey::Note(*id), captured) {
                notes.insert(*id, local.clone());
            }
        }
        notes.retain(|id, _| {
            let key = EntityKey::Note(*id);
            !self.tracker.touched_since(&key, captured) || self.entities.notes.contains_key(id)
        });

        let mut categories = merged.categories;
        for (id, local) in &self.entities.categories {
            if self
                .tracker
                .touched_since(&EntityKey::Category(id.clone()), captured)
            {
                categories.insert(id.clone(), local.clone());
            }
        }
        categories.retain(|id, _| {
            let key = EntityKey::Category(id.clone());
            !self.tracker.touched_since(&key, captured)
                || self.entities.categories.contains_key(id)
        });

        self.entities = EntitySet { notes, categories };
        self.tracker.acknowledge(captured, pushed);
        self.remote_version = Some(remote_version);
        self.prune_dangling_categories(now);
        self.ensure_scratchpad(now);
    }
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::new()
    }
}
