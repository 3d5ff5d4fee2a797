//! takenote-core - Core library for TakeNote
//!
//! This crate contains the note and category models, the in-memory entity
//! store with its change tracker, the merge engine, the sync coordinator and
//! its remote gateways, and the local `SQLite` persistence used by the CLI.

pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod merge;
pub mod models;
pub mod state;
pub mod store;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{Category, CategoryId, Note, NoteId, SyncConflict, SyncSnapshot};
pub use state::{SyncState, SyncStatus};
pub use store::{EntityStore, Mutation, NoteFilter, NotesSortKey};
pub use sync::{RemoteGateway, SyncCoordinator, SyncError, SyncReport};
