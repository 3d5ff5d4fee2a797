use std::io;

use takenote_core::SyncError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] takenote_core::Error),
    #[error("Sync failed: {0}")]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No note content provided")]
    EmptyContent,
    #[error("Edited note content cannot be empty")]
    EmptyEditedContent,
    #[error("Category name cannot be empty")]
    EmptyCategoryName,
    #[error("Category not found: {0}")]
    CategoryNotFound(String),
    #[error("{0}")]
    AmbiguousCategory(String),
    #[error("Editor command failed: {0}")]
    EditorFailed(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error(
        "Sync is not configured. Run `takenote config init --remote file --path <PATH>` or `takenote config init --remote gist --gist-id <ID>`."
    )]
    SyncNotConfigured,
}
