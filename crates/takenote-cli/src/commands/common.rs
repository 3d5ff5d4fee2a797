use std::env;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Utc;
use serde::Serialize;
use takenote_core::db::{Database, LocalRepository};
use takenote_core::{CategoryId, EntityStore, Note, SyncConflict};

use crate::error::CliError;

pub const DB_PATH_ENV: &str = "TAKENOTE_DB_PATH";

#[derive(Debug, Serialize)]
pub struct NoteListItem {
    pub id: String,
    pub title: String,
    pub preview: String,
    pub content: String,
    pub category: Option<String>,
    pub favorite: bool,
    pub trash: bool,
    pub scratchpad: bool,
    pub created_at: i64,
    pub updated_at: i64,
    pub relative_time: String,
}

#[derive(Debug, Serialize)]
pub struct SyncConflictItem {
    pub entity: String,
    pub local_updated_at: i64,
    pub remote_updated_at: i64,
    pub resolution: String,
    pub strategy: String,
    pub resolved_at: i64,
    pub resolved_at_iso: String,
}

pub fn open_database(path: &Path) -> Result<Database, CliError> {
    Ok(Database::open(path)?)
}

pub fn load_store(db_path: &Path) -> Result<EntityStore, CliError> {
    let db = open_database(db_path)?;
    Ok(db.repository().load_store()?)
}

/// Load the store, run `update` against it and persist the result
pub fn update_store<T>(
    db_path: &Path,
    update: impl FnOnce(&mut EntityStore) -> Result<T, CliError>,
) -> Result<T, CliError> {
    let db = open_database(db_path)?;
    let repo = db.repository();
    let mut store = repo.load_store()?;
    let value = update(&mut store)?;
    repo.save_store(&store)?;
    Ok(value)
}

/// Match a category by id, then by case-insensitive name, then by slug
pub fn resolve_category(store: &EntityStore, query: &str) -> Result<CategoryId, CliError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(CliError::EmptyCategoryName);
    }

    let by_id = CategoryId::from_raw(query);
    if store.category(&by_id).is_some() {
        return Ok(by_id);
    }

    let by_name = store
        .categories()
        .into_iter()
        .filter(|category| category.name.eq_ignore_ascii_case(query))
        .collect::<Vec<_>>();
    match by_name.as_slice() {
        [category] => return Ok(category.id.clone()),
        [] => {}
        matches => {
            let options = matches
                .iter()
                .map(|category| category.id.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(CliError::AmbiguousCategory(format!(
                "category name '{query}' is ambiguous; use one of: {options}"
            )));
        }
    }

    CategoryId::from_name(query)
        .filter(|slug| store.category(slug).is_some())
        .ok_or_else(|| CliError::CategoryNotFound(query.to_string()))
}

pub fn category_label(store: &EntityStore, note: &Note) -> Option<String> {
    note.category
        .as_ref()
        .and_then(|id| store.category(id))
        .map(|category| category.name.clone())
}

pub fn format_note_lines(store: &EntityStore, notes: &[&Note]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    notes
        .iter()
        .map(|note| {
            let short_id = note.id.short();
            let preview = note_preview(note, 40);
            let relative_time = format_relative_time(note.updated_at, now_ms);
            let markers = render_markers(store, note);

            if markers.is_empty() {
                format!("{short_id:<13}  {preview:<40}  {relative_time}")
            } else {
                format!("{short_id:<13}  {preview:<40}  {relative_time:<10}  {markers}")
            }
        })
        .collect()
}

fn render_markers(store: &EntityStore, note: &Note) -> String {
    let mut markers = Vec::new();
    if note.scratchpad {
        markers.push("(scratchpad)".to_string());
    }
    if note.favorite {
        markers.push("*".to_string());
    }
    if let Some(category) = category_label(store, note) {
        markers.push(format!("[{category}]"));
    }
    markers.join(" ")
}

pub fn note_to_list_item(store: &EntityStore, note: &Note) -> NoteListItem {
    let now_ms = Utc::now().timestamp_millis();

    NoteListItem {
        id: note.id.to_string(),
        title: note.title(),
        preview: note_preview(note, 80),
        content: note.content.clone(),
        category: category_label(store, note),
        favorite: note.favorite,
        trash: note.trash,
        scratchpad: note.scratchpad,
        created_at: note.created_at,
        updated_at: note.updated_at,
        relative_time: format_relative_time(note.updated_at, now_ms),
    }
}

pub fn note_preview(note: &Note, max_chars: usize) -> String {
    let first_line = note.content.lines().next().unwrap_or("").trim();
    let collapsed = first_line.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn sync_conflict_to_item(conflict: &SyncConflict) -> SyncConflictItem {
    SyncConflictItem {
        entity: conflict.key.to_string(),
        local_updated_at: conflict.local_updated_at,
        remote_updated_at: conflict.remote_updated_at,
        resolution: conflict.resolution.as_str().to_string(),
        strategy: conflict.strategy().to_string(),
        resolved_at: conflict.resolved_at,
        resolved_at_iso: format_sync_timestamp(conflict.resolved_at),
    }
}

pub fn format_sync_conflict_lines(conflicts: &[SyncConflict]) -> Vec<String> {
    conflicts
        .iter()
        .map(|conflict| {
            format!(
                "{}  {:<4}  {:<11}  {}  local={} remote={}",
                format_sync_timestamp(conflict.resolved_at),
                conflict.strategy(),
                conflict.resolution.as_str(),
                conflict.key,
                conflict.local_updated_at,
                conflict.remote_updated_at
            )
        })
        .collect()
}

pub fn format_sync_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

pub fn resolve_note_content(content_parts: &[String]) -> Result<String, CliError> {
    if let Some(content) = normalize_content(&content_parts.join(" ")) {
        return Ok(content);
    }

    if let Some(content) = read_piped_stdin()? {
        return Ok(content);
    }

    if let Some(content) = capture_editor_input()? {
        return Ok(content);
    }

    Err(CliError::EmptyContent)
}

pub fn normalize_content(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn normalize_category_name(parts: &[String]) -> Result<String, CliError> {
    let joined = parts.join(" ");
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyCategoryName)
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    Ok(normalize_content(&buffer))
}

pub fn capture_editor_input() -> Result<Option<String>, CliError> {
    capture_editor_input_with_initial("")
}

pub fn capture_editor_input_with_initial(
    initial_content: &str,
) -> Result<Option<String>, CliError> {
    let editor = preferred_editor();
    let temp_file = create_temp_note_file_path();
    std::fs::write(&temp_file, initial_content)?;

    let launch_result = launch_editor(&editor, &temp_file);
    let note_content = std::fs::read_to_string(&temp_file)?;
    let _ = std::fs::remove_file(&temp_file);

    launch_result?;
    Ok(normalize_content(&note_content))
}

pub fn launch_editor(editor: &str, file_path: &Path) -> Result<(), CliError> {
    let mut parts = editor.split_whitespace();
    let Some(program) = parts.next() else {
        return Err(CliError::EditorFailed("empty EDITOR command".into()));
    };

    let status = Command::new(program).args(parts).arg(file_path).status()?;
    if status.success() {
        Ok(())
    } else {
        Err(CliError::EditorFailed(format!(
            "`{editor}` exited with status {status}"
        )))
    }
}

pub fn preferred_editor() -> String {
    env::var("VISUAL")
        .or_else(|_| env::var("EDITOR"))
        .unwrap_or_else(|_| default_editor().to_string())
}

pub const fn default_editor() -> &'static str {
    if cfg!(windows) {
        "notepad"
    } else {
        "vi"
    }
}

pub fn create_temp_note_file_path() -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_nanos());
    env::temp_dir().join(format!("takenote-{}-{now}.md", std::process::id()))
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> Result<PathBuf, CliError> {
    if let Some(path) = cli_db_path.or_else(|| env::var_os(DB_PATH_ENV).map(PathBuf::from)) {
        return Ok(path);
    }
    default_db_path()
}

pub fn default_db_path() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join("takenote").join("takenote.db"))
        .ok_or_else(|| CliError::Config("Failed to resolve CLI data directory".into()))
}
