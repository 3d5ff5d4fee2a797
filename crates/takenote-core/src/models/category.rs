//! Category model

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::LazyLock;

static NON_SLUG_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("Invalid regex"));

/// Category identifier, derived from the display name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryId(String);

impl CategoryId {
    /// Derive the id for a display name; `None` if the name has no usable characters
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let slug = slugify(name);
        if slug.is_empty() {
            None
        } else {
            Some(Self(slug))
        }
    }

    /// Wrap an id read back from storage without re-deriving it
    #[must_use]
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalize a display name into a category id
///
/// # Examples
///
/// ```
/// use takenote_core::models::slugify;
///
/// assert_eq!(slugify("  My Work Notes! "), "my-work-notes");
/// ```
#[must_use]
pub fn slugify(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    NON_SLUG_CHARS
        .replace_all(&lowered, "-")
        .trim_matches('-')
        .to_string()
}

/// A folder notes can be assigned to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    /// Display name as typed by the user
    pub name: String,
    /// Sidebar ordering, lowest first
    pub position: u32,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
}

impl Category {
    /// Create a category; returns `None` when the name yields an empty id
    #[must_use]
    pub fn new(name: &str, position: u32, now: i64) -> Option<Self> {
        let name = name.trim();
        let id = CategoryId::from_name(name)?;
        Some(Self {
            id,
            name: name.to_string(),
            position,
            created_at: now,
            updated_at: now,
        })
    }

    /// Content hash over name and position
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.id.as_str().as_bytes());
        hasher.update([0]);
        hasher.update(self.name.as_bytes());
        hasher.update([0]);
        hasher.update(self.position.to_be_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Work"), "work");
        assert_eq!(slugify("Side  Projects / 2024"), "side-projects-2024");
        assert_eq!(slugify("--Ünïcode--"), "n-code");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_category_new_derives_id() {
        let category = Category::new("  Reading List ", 3, 10).unwrap();
        assert_eq!(category.id.as_str(), "reading-list");
        assert_eq!(category.name, "Reading List");
        assert_eq!(category.position, 3);
    }

    #[test]
    fn test_category_new_rejects_symbol_only_name() {
        assert!(Category::new("???", 0, 0).is_none());
    }

    #[test]
    fn test_fingerprint_tracks_position() {
        let mut category = Category::new("Work", 0, 0).unwrap();
        let before = category.fingerprint();
        category.position = 1;
        assert_ne!(before, category.fingerprint());
    }
}
