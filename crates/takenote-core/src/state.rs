//! Shared sync status types.

use serde::{Deserialize, Serialize};

use crate::sync::SyncReport;

/// Coordinator lifecycle: `Idle -> Syncing -> Idle`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    #[default]
    Idle,
    Syncing,
}

impl SyncState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Syncing => "syncing",
        }
    }
}

/// What the coordinator last did
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub state: SyncState,
    /// Unix ms of the last successful sync
    pub last_synced_at: Option<i64>,
    /// Message of the last failed attempt, cleared on success
    pub last_error: Option<String>,
    pub last_report: Option<SyncReport>,
}

impl SyncStatus {
    #[must_use]
    pub const fn is_syncing(&self) -> bool {
        matches!(self.state, SyncState::Syncing)
    }
}
