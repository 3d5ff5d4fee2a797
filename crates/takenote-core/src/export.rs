//! Note export helpers.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::models::Note;
use crate::store::{EntityStore, NoteFilter, NotesSortKey};

/// Export output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    Json,
    Markdown,
}

impl ExportFormat {
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Markdown => "md",
        }
    }
}

/// Serializable note representation used in JSON and Markdown exports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportNote {
    pub id: String,
    pub title: String,
    pub content: String,
    /// Category display name
    pub category: Option<String>,
    pub favorite: bool,
    pub trash: bool,
    pub scratchpad: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Convert a note into an export record, resolving its category name.
#[must_use]
pub fn note_to_export_item(store: &EntityStore, note: &Note) -> ExportNote {
    let category = note
        .category
        .as_ref()
        .and_then(|id| store.category(id))
        .map(|category| category.name.clone());

    ExportNote {
        id: note.id.to_string(),
        title: note.title(),
        content: note.content.clone(),
        category,
        favorite: note.favorite,
        trash: note.trash,
        scratchpad: note.scratchpad,
        created_at: note.created_at,
        updated_at: note.updated_at,
    }
}

/// Every note in the store, scratchpad first, then most recently updated;
/// trashed notes only when `include_trash` is set.
#[must_use]
pub fn collect_export_notes(store: &EntityStore, include_trash: bool) -> Vec<ExportNote> {
    let mut notes = store.notes_view(&NoteFilter::Scratchpad, NotesSortKey::LastUpdated);
    notes.extend(store.notes_view(&NoteFilter::All, NotesSortKey::LastUpdated));
    if include_trash {
        notes.extend(store.notes_view(&NoteFilter::Trash, NotesSortKey::LastUpdated));
    }
    notes
        .into_iter()
        .map(|note| note_to_export_item(store, note))
        .collect()
}

/// Render notes as pretty-printed JSON.
pub fn render_json_export(notes: &[ExportNote]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(notes)
}

/// Render notes in Markdown with frontmatter blocks.
#[must_use]
pub fn render_markdown_export(notes: &[ExportNote]) -> String {
    let mut output = String::new();

    for (index, note) in notes.iter().enumerate() {
        if index > 0 {
            output.push('\n');
        }

        let _ = writeln!(output, "---");
        let _ = writeln!(output, "id: {}", note.id);
        let _ = writeln!(output, "title: {}", note.title);
        if let Some(category) = &note.category {
            let _ = writeln!(output, "category: {category}");
        }
        let _ = writeln!(output, "favorite: {}", note.favorite);
        if note.trash {
            let _ = writeln!(output, "trash: true");
        }
        if note.scratchpad {
            let _ = writeln!(output, "scratchpad: true");
        }
        let _ = writeln!(output, "created_at: {}", note.created_at);
        let _ = writeln!(output, "updated_at: {}", note.updated_at);
        let _ = writeln!(output, "---");
        let _ = writeln!(output);
        output.push_str(&note.content);
        output.push('\n');
    }

    output
}

/// Render notes based on selected export format.
pub fn render_notes_export(notes: &[ExportNote], format: ExportFormat) -> serde_json::Result<String> {
    match format {
        ExportFormat::Json => render_json_export(notes),
        ExportFormat::Markdown => Ok(render_markdown_export(notes)),
    }
}

/// Build a deterministic default file name for export flows.
#[must_use]
pub fn suggested_export_file_name(format: ExportFormat, timestamp_ms: i64) -> String {
    format!("takenote-export-{timestamp_ms}.{}", format.extension())
}
