use std::path::Path;

use takenote_core::Mutation;

use crate::commands::common::{capture_editor_input_with_initial, load_store, update_store};
use crate::error::CliError;

pub fn run_edit(id: &str, db_path: &Path) -> Result<(), CliError> {
    let store = load_store(db_path)?;
    let note_id = store.resolve_note(id)?;
    let current = store
        .note(&note_id)
        .map(|note| note.content.clone())
        .unwrap_or_default();

    // The scratchpad may legitimately be emptied.
    let edited_content = match capture_editor_input_with_initial(&current)? {
        Some(content) => content,
        None if store.scratchpad().is_some_and(|note| note.id == note_id) => String::new(),
        None => return Err(CliError::EmptyEditedContent),
    };

    if edited_content == current {
        println!("{note_id}");
        return Ok(());
    }

    update_store(db_path, |store| {
        Ok(store.apply(Mutation::UpdateNoteContent {
            id: note_id,
            content: edited_content,
        })?)
    })?;
    println!("{note_id}");
    Ok(())
}
