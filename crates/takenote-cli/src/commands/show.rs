use std::path::Path;

use crate::commands::common::{category_label, format_sync_timestamp, load_store, note_to_list_item};
use crate::error::CliError;

pub fn run_show(id: &str, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let store = load_store(db_path)?;
    let note_id = store.resolve_note(id)?;
    let Some(note) = store.note(&note_id) else {
        return Err(takenote_core::Error::NotFound(format!("note {id}")).into());
    };

    if as_json {
        println!(
            "{}",
            serde_json::to_string_pretty(&note_to_list_item(&store, note))?
        );
        return Ok(());
    }

    println!("id:       {}", note.id);
    if let Some(category) = category_label(&store, note) {
        println!("category: {category}");
    }
    if note.favorite {
        println!("favorite: yes");
    }
    if note.trash {
        println!("trash:    yes");
    }
    println!("updated:  {}", format_sync_timestamp(note.updated_at));
    println!();
    println!("{}", note.content);
    Ok(())
}
