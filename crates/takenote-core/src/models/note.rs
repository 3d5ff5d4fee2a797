//! Note model

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::CategoryId;

/// Length of the short id shown in lists and used for `{{short-id}}` links
pub const SHORT_ID_LEN: usize = 13;

/// A unique identifier for a note, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(Uuid);

impl NoteId {
    /// Create a new unique note ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }

    /// Short form used for display and note references
    #[must_use]
    pub fn short(&self) -> String {
        self.as_str().chars().take(SHORT_ID_LEN).collect()
    }
}

impl Default for NoteId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NoteId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A note in the system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Unique identifier
    pub id: NoteId,
    /// Markdown content
    pub content: String,
    /// Owning category, `None` when unassigned
    #[serde(default)]
    pub category: Option<CategoryId>,
    /// Shown in the favorites view
    #[serde(default)]
    pub favorite: bool,
    /// Soft-deleted; kept until permanently deleted
    #[serde(default)]
    pub trash: bool,
    /// The always-present scratchpad note
    #[serde(default)]
    pub scratchpad: bool,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
}

impl Note {
    /// Create a new note with the given content, stamped at `now`
    #[must_use]
    pub fn new(content: impl Into<String>, now: i64) -> Self {
        Self {
            id: NoteId::new(),
            content: content.into(),
            category: None,
            favorite: false,
            trash: false,
            scratchpad: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create the scratchpad note
    #[must_use]
    pub fn scratchpad(now: i64) -> Self {
        Self {
            scratchpad: true,
            ..Self::new("# Scratchpad\n\nThe easiest note to find.", now)
        }
    }

    /// Display title: first non-empty line with markdown heading markers removed
    #[must_use]
    pub fn title(&self) -> String {
        let title = self
            .content
            .lines()
            .map(|line| line.trim_start_matches('#').trim())
            .find(|line| !line.is_empty())
            .unwrap_or("");
        if title.is_empty() {
            "New note".to_string()
        } else {
            title.to_string()
        }
    }

    /// Get first line as title preview, truncated to `max_len` characters
    #[must_use]
    pub fn title_preview(&self, max_len: usize) -> String {
        self.title().chars().take(max_len).collect()
    }

    /// Check if note content is empty (whitespace-only counts as empty)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty()
    }

    /// Content hash over everything a user can change.
    ///
    /// Timestamps are excluded so two replicas holding the same edit agree.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.content.as_bytes());
        hasher.update([0]);
        if let Some(category) = &self.category {
            hasher.update(category.as_str().as_bytes());
        }
        hasher.update([0, u8::from(self.favorite), u8::from(self.trash), u8::from(self.scratchpad)]);
        format!("{:x}", hasher.finalize())
    }
}
