use std::path::Path;

use takenote_core::Mutation;

use crate::commands::common::update_store;
use crate::commands::note_flags::apply_to_note;
use crate::error::CliError;

pub fn run_delete(id: &str, db_path: &Path) -> Result<(), CliError> {
    let note_id = apply_to_note(id, db_path, |id| Mutation::DeleteNotePermanently { id })?;
    println!("{note_id}");
    Ok(())
}

pub fn run_empty_trash(db_path: &Path) -> Result<(), CliError> {
    let applied = update_store(db_path, |store| Ok(store.apply(Mutation::EmptyTrash)?))?;
    let count = applied.touched.len();
    println!(
        "Deleted {count} trashed note{}",
        if count == 1 { "" } else { "s" }
    );
    Ok(())
}
