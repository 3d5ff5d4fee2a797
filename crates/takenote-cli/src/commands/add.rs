use std::path::Path;

use takenote_core::Mutation;

use crate::commands::common::{resolve_category, resolve_note_content, update_store};
use crate::error::CliError;

pub fn run_add(
    content_parts: &[String],
    category: Option<&str>,
    db_path: &Path,
) -> Result<(), CliError> {
    let content = resolve_note_content(content_parts)?;

    let applied = update_store(db_path, |store| {
        let category = category
            .map(|query| resolve_category(store, query))
            .transpose()?;
        Ok(store.apply(Mutation::CreateNote { content, category })?)
    })?;

    if let Some(id) = applied.note_id() {
        println!("{id}");
    }
    Ok(())
}
