//! Sync conflict model

use serde::{Deserialize, Serialize};

use super::{Category, EntityKey, Note};

/// Which side won a conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    LocalWins,
    RemoteWins,
}

impl ConflictResolution {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LocalWins => "local_wins",
            Self::RemoteWins => "remote_wins",
        }
    }
}

/// The version that lost, kept for inspection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiscardedVersion {
    Note(Note),
    Category(Category),
    /// A deletion that was overridden by a newer edit
    Deletion { deleted_at: i64 },
}

/// Recorded sync conflict resolved by last-writer-wins
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConflict {
    /// Entity involved in the conflict
    pub key: EntityKey,
    /// Local side's timestamp when the conflict occurred
    pub local_updated_at: i64,
    /// Remote side's timestamp
    pub remote_updated_at: i64,
    pub resolution: ConflictResolution,
    pub discarded: DiscardedVersion,
    /// Resolution timestamp (Unix ms)
    pub resolved_at: i64,
}

impl SyncConflict {
    /// Resolution strategy name
    #[must_use]
    pub const fn strategy(&self) -> &'static str {
        "lww"
    }
}
