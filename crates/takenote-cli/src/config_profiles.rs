//! Persistent CLI profile configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use takenote_core::config::{RemoteConfig, SyncSettings};

const CONFIG_FILE_NAME: &str = "cli-config.json";
pub const PROFILE_ENV: &str = "TAKENOTE_PROFILE";
pub const GITHUB_TOKEN_ENV: &str = "TAKENOTE_GITHUB_TOKEN";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CliProfilesConfig {
    #[serde(default = "default_config_version")]
    pub version: u32,
    #[serde(default)]
    pub active_profile: Option<String>,
    #[serde(default)]
    pub profiles: BTreeMap<String, CliProfile>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CliProfile {
    /// Where this profile's snapshot lives; `None` keeps the profile local-only
    #[serde(default)]
    pub remote: Option<RemoteConfig>,
    #[serde(default)]
    pub sync: SyncSettings,
}

const fn default_config_version() -> u32 {
    1
}

pub fn default_config_path() -> Result<PathBuf, String> {
    dirs::config_dir()
        .map(|dir| dir.join("takenote").join(CONFIG_FILE_NAME))
        .ok_or_else(|| "Failed to resolve CLI config directory".to_string())
}

pub fn normalize_profile_name(value: Option<&str>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Token for the gist remote, read from the environment (or `.env`)
pub fn github_token() -> Option<String> {
    takenote_core::util::normalize_text_option(std::env::var(GITHUB_TOKEN_ENV).ok())
}

impl CliProfilesConfig {
    pub fn load() -> Result<Self, String> {
        Self::load_from_path(&default_config_path()?)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|error| format!("Failed to read config at {}: {}", path.display(), error))?;
        let config = serde_json::from_str::<Self>(&raw)
            .map_err(|error| format!("Failed to parse config at {}: {}", path.display(), error))?;
        config.normalized()
    }

    pub fn save(&self) -> Result<PathBuf, String> {
        let path = default_config_path()?;
        self.save_to_path(&path)?;
        Ok(path)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| {
                format!(
                    "Failed to create config directory {}: {}",
                    parent.display(),
                    error
                )
            })?;
        }

        let normalized = self.clone().normalized()?;
        let serialized = serde_json::to_string_pretty(&normalized)
            .map_err(|error| format!("Failed to serialize config: {error}"))?;
        std::fs::write(path, serialized)
            .map_err(|error| format!("Failed to write config at {}: {}", path.display(), error))
    }

    /// Explicit flag, then `TAKENOTE_PROFILE`, then the active profile
    pub fn resolve_profile_name(&self, explicit: Option<&str>) -> String {
        if let Some(profile) = normalize_profile_name(explicit) {
            return profile;
        }
        if let Some(profile) = normalize_profile_name(std::env::var(PROFILE_ENV).ok().as_deref()) {
            return profile;
        }
        if let Some(profile) = normalize_profile_name(self.active_profile.as_deref()) {
            return profile;
        }
        "default".to_string()
    }

    pub fn profile(&self, name: &str) -> Option<&CliProfile> {
        self.profiles.get(name)
    }

    pub fn profile_mut_or_default(&mut self, name: &str) -> &mut CliProfile {
        self.profiles.entry(name.to_string()).or_default()
    }

    fn normalized(mut self) -> Result<Self, String> {
        self.active_profile = normalize_profile_name(self.active_profile.as_deref());
        for (name, profile) in &mut self.profiles {
            profile
                .normalize()
                .map_err(|error| format!("Profile '{name}': {error}"))?;
        }
        Ok(self)
    }
}

impl CliProfile {
    fn normalize(&mut self) -> Result<(), String> {
        self.sync.validate().map_err(|error| error.to_string())?;
        if let Some(remote) = self.remote.take() {
            self.remote = Some(remote.normalized().map_err(|error| error.to_string())?);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn normalize_profile_name_rejects_empty() {
        assert_eq!(normalize_profile_name(None), None);
        assert_eq!(normalize_profile_name(Some(" ")), None);
        assert_eq!(
            normalize_profile_name(Some(" work ")),
            Some("work".to_string())
        );
    }

    #[test]
    fn config_roundtrip_preserves_profiles() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);

        let mut config = CliProfilesConfig {
            version: 1,
            active_profile: Some("laptop".to_string()),
            ..CliProfilesConfig::default()
        };
        config.profile_mut_or_default("laptop").remote = Some(RemoteConfig::File {
            path: PathBuf::from("/tmp/shared/takenote.json"),
        });
        config.profile_mut_or_default("work").remote = Some(RemoteConfig::gist("abc123"));

        config.save_to_path(&path).unwrap();
        let loaded = CliProfilesConfig::load_from_path(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn missing_config_file_loads_default() {
        let dir = tempdir().unwrap();
        let loaded = CliProfilesConfig::load_from_path(&dir.path().join("absent.json")).unwrap();
        assert_eq!(loaded, CliProfilesConfig::default());
    }

    #[test]
    fn load_rejects_invalid_sync_settings() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(
            &path,
            r#"{"version": 1, "profiles": {"default": {"sync": {"timeout_secs": 0}}}}"#,
        )
        .unwrap();

        let error = CliProfilesConfig::load_from_path(&path).unwrap_err();
        assert!(error.contains("Profile 'default'"));
    }

    #[test]
    fn profile_without_sync_section_uses_defaults() {
        let profile: CliProfile = serde_json::from_str(
            r#"{"remote": {"kind": "gist", "gist_id": "abc123"}}"#,
        )
        .unwrap();
        assert_eq!(profile.sync, SyncSettings::default());
        assert_eq!(profile.remote, Some(RemoteConfig::gist("abc123")));
    }

    #[test]
    fn explicit_profile_name_wins() {
        let config = CliProfilesConfig {
            active_profile: Some("laptop".to_string()),
            ..CliProfilesConfig::default()
        };
        assert_eq!(config.resolve_profile_name(Some("work")), "work");
    }
}
