//! Sync configuration.
//!
//! [`SyncSettings`] tunes the coordinator; [`RemoteConfig`] says where the
//! shared snapshot lives. Both are plain serde structs so the CLI can keep
//! them in its profile file.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::{is_http_url, normalize_text_option};

const DEFAULT_TIMEOUT_SECS: u64 = 15;
const DEFAULT_TOMBSTONE_RETENTION_DAYS: u64 = 30;
const MAX_TIMEOUT_SECS: u64 = 600;

pub const DEFAULT_GIST_API_BASE_URL: &str = "https://api.github.com";
pub const DEFAULT_SNAPSHOT_FILE_NAME: &str = "takenote.json";

/// Coordinator tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncSettings {
    /// Bound on each gateway call, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// How long deletion markers stay in the shared snapshot, in days
    #[serde(default = "default_tombstone_retention_days")]
    pub tombstone_retention_days: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            tombstone_retention_days: DEFAULT_TOMBSTONE_RETENTION_DAYS,
        }
    }
}

impl SyncSettings {
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    #[must_use]
    pub fn tombstone_retention_ms(&self) -> i64 {
        let millis = self
            .tombstone_retention_days
            .saturating_mul(24 * 60 * 60 * 1000);
        i64::try_from(millis).unwrap_or(i64::MAX)
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout_secs == 0 || self.timeout_secs > MAX_TIMEOUT_SECS {
            return Err(Error::Config(format!(
                "sync timeout must be between 1 and {MAX_TIMEOUT_SECS} seconds"
            )));
        }
        if self.tombstone_retention_days == 0 {
            return Err(Error::Config(
                "tombstone retention must be at least one day".to_string(),
            ));
        }
        Ok(())
    }
}

const fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

const fn default_tombstone_retention_days() -> u64 {
    DEFAULT_TOMBSTONE_RETENTION_DAYS
}

/// Where the shared snapshot is stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RemoteConfig {
    /// A JSON file, e.g. in a folder synced by another tool
    File { path: PathBuf },
    /// A GitHub gist holding the snapshot as one file
    Gist {
        gist_id: String,
        #[serde(default = "default_gist_api_base_url")]
        api_base_url: String,
        #[serde(default = "default_snapshot_file_name")]
        file_name: String,
    },
}

impl RemoteConfig {
    #[must_use]
    pub fn gist(gist_id: impl Into<String>) -> Self {
        Self::Gist {
            gist_id: gist_id.into(),
            api_base_url: default_gist_api_base_url(),
            file_name: default_snapshot_file_name(),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::File { .. } => "file",
            Self::Gist { .. } => "gist",
        }
    }

    /// Trim values and reject unusable ones
    pub fn normalized(self) -> Result<Self> {
        match self {
            Self::File { path } => {
                if path.as_os_str().is_empty() {
                    return Err(Error::Config("remote file path must not be empty".into()));
                }
                Ok(Self::File { path })
            }
            Self::Gist {
                gist_id,
                api_base_url,
                file_name,
            } => {
                let gist_id = normalize_text_option(Some(gist_id))
                    .ok_or_else(|| Error::Config("gist id must not be empty".into()))?;
                let api_base_url = normalize_text_option(Some(api_base_url))
                    .unwrap_or_else(default_gist_api_base_url);
                if !is_http_url(&api_base_url) {
                    return Err(Error::Config(
                        "gist API base URL must include http:// or https://".into(),
                    ));
                }
                let file_name = normalize_text_option(Some(file_name))
                    .unwrap_or_else(default_snapshot_file_name);
                Ok(Self::Gist {
                    gist_id,
                    api_base_url: api_base_url.trim_end_matches('/').to_string(),
                    file_name,
                })
            }
        }
    }
}

fn default_gist_api_base_url() -> String {
    DEFAULT_GIST_API_BASE_URL.to_string()
}

fn default_snapshot_file_name() -> String {
    DEFAULT_SNAPSHOT_FILE_NAME.to_string()
}
