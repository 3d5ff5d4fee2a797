//! Data models for TakeNote

mod category;
mod note;
mod snapshot;
mod sync_conflict;

pub use category::{slugify, Category, CategoryId};
pub use note::{Note, NoteId, SHORT_ID_LEN};
pub use snapshot::{EntityKey, SyncSnapshot, Tombstone};
pub use sync_conflict::{ConflictResolution, DiscardedVersion, SyncConflict};
