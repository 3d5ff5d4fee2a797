//! Favorite, trash, restore and move: single-field note edits.

use std::path::Path;

use takenote_core::{Mutation, NoteId};

use crate::commands::common::{resolve_category, update_store};
use crate::error::CliError;

pub fn run_favorite(id: &str, db_path: &Path) -> Result<(), CliError> {
    let (note_id, favorite) = update_store(db_path, |store| {
        let note_id = store.resolve_note(id)?;
        store.apply(Mutation::ToggleFavorite { id: note_id })?;
        Ok((note_id, store.note(&note_id).is_some_and(|note| note.favorite)))
    })?;

    if favorite {
        println!("{note_id} marked as favorite");
    } else {
        println!("{note_id} removed from favorites");
    }
    Ok(())
}

pub fn run_trash(id: &str, db_path: &Path) -> Result<(), CliError> {
    let note_id = update_store(db_path, |store| {
        let note_id = store.resolve_note(id)?;
        if !store.note(&note_id).is_some_and(|note| note.trash) {
            store.apply(Mutation::ToggleTrash { id: note_id })?;
        }
        Ok(note_id)
    })?;
    println!("{note_id}");
    Ok(())
}

pub fn run_restore(id: &str, db_path: &Path) -> Result<(), CliError> {
    let note_id = apply_to_note(id, db_path, |id| Mutation::RestoreNote { id })?;
    println!("{note_id}");
    Ok(())
}

pub fn run_move(id: &str, category: Option<&str>, db_path: &Path) -> Result<(), CliError> {
    let note_id = update_store(db_path, |store| {
        let note_id = store.resolve_note(id)?;
        let category = category
            .map(|query| resolve_category(store, query))
            .transpose()?;
        store.apply(Mutation::MoveNoteToCategory {
            id: note_id,
            category,
        })?;
        Ok(note_id)
    })?;
    println!("{note_id}");
    Ok(())
}

pub(crate) fn apply_to_note(
    id: &str,
    db_path: &Path,
    mutation: impl FnOnce(NoteId) -> Mutation,
) -> Result<NoteId, CliError> {
    update_store(db_path, |store| {
        let note_id = store.resolve_note(id)?;
        store.apply(mutation(note_id))?;
        Ok(note_id)
    })
}
