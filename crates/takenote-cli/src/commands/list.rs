use std::path::Path;

use takenote_core::{EntityStore, NoteFilter, NotesSortKey};

use crate::cli::SortOrder;
use crate::commands::common::{
    format_note_lines, load_store, note_to_list_item, resolve_category, NoteListItem,
};
use crate::error::CliError;

/// Which notes `list` shows
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListSelection {
    pub category: Option<String>,
    pub favorites: bool,
    pub trash: bool,
    pub scratchpad: bool,
}

impl ListSelection {
    pub fn to_filter(&self, store: &EntityStore) -> Result<NoteFilter, CliError> {
        if let Some(query) = &self.category {
            return Ok(NoteFilter::Category(resolve_category(store, query)?));
        }
        Ok(if self.scratchpad {
            NoteFilter::Scratchpad
        } else if self.trash {
            NoteFilter::Trash
        } else if self.favorites {
            NoteFilter::Favorites
        } else {
            NoteFilter::All
        })
    }
}

pub const fn sort_key(order: SortOrder) -> NotesSortKey {
    match order {
        SortOrder::LastUpdated => NotesSortKey::LastUpdated,
        SortOrder::Title => NotesSortKey::Title,
        SortOrder::Created => NotesSortKey::CreatedDate,
    }
}

pub fn run_list(
    selection: &ListSelection,
    order: SortOrder,
    limit: usize,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let store = load_store(db_path)?;
    let filter = selection.to_filter(&store)?;
    let notes = store
        .notes_view(&filter, sort_key(order))
        .into_iter()
        .take(limit)
        .collect::<Vec<_>>();

    if as_json {
        let json_items = notes
            .iter()
            .map(|note| note_to_list_item(&store, note))
            .collect::<Vec<NoteListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else {
        for line in format_note_lines(&store, &notes) {
            println!("{line}");
        }
    }

    Ok(())
}
