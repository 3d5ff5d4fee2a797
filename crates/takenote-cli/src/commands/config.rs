use std::path::PathBuf;

use takenote_core::config::{
    RemoteConfig, DEFAULT_GIST_API_BASE_URL, DEFAULT_SNAPSHOT_FILE_NAME,
};
use takenote_core::util::normalize_text_option;

use crate::cli::{ConfigCommands, RemoteKind};
use crate::config_profiles::{github_token, CliProfilesConfig, GITHUB_TOKEN_ENV};
use crate::error::CliError;

/// Remote flags passed to `config init`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteArgs {
    pub kind: Option<RemoteKind>,
    pub path: Option<PathBuf>,
    pub gist_id: Option<String>,
    pub api_base_url: Option<String>,
    pub file_name: Option<String>,
}

pub fn run_config(command: ConfigCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            profile,
            remote,
            path,
            gist_id,
            api_base_url,
            file_name,
            timeout_secs,
            tombstone_retention_days,
            no_activate,
        } => run_config_init(
            profile.as_deref().or(global_profile),
            RemoteArgs {
                kind: remote,
                path,
                gist_id,
                api_base_url,
                file_name,
            },
            timeout_secs,
            tombstone_retention_days,
            no_activate,
        ),
        ConfigCommands::Show { profile } => run_config_show(profile.as_deref().or(global_profile)),
    }
}

pub fn run_config_init(
    profile_name: Option<&str>,
    remote_args: RemoteArgs,
    timeout_secs: Option<u64>,
    tombstone_retention_days: Option<u64>,
    no_activate: bool,
) -> Result<(), CliError> {
    let mut config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(profile_name);

    let profile = config.profile_mut_or_default(&profile_name);
    profile.remote = merge_remote(profile.remote.take(), remote_args)?;
    if let Some(value) = timeout_secs {
        profile.sync.timeout_secs = value;
    }
    if let Some(value) = tombstone_retention_days {
        profile.sync.tombstone_retention_days = value;
    }
    profile
        .sync
        .validate()
        .map_err(|error| CliError::Config(error.to_string()))?;
    let is_gist = matches!(profile.remote, Some(RemoteConfig::Gist { .. }));

    if !no_activate {
        config.active_profile = Some(profile_name.clone());
    }

    let path = config.save().map_err(CliError::Config)?;
    println!(
        "Saved profile '{}' to {}",
        profile_name,
        path.display()
    );
    if is_gist && github_token().is_none() {
        println!("Set {GITHUB_TOKEN_ENV} (environment or .env) before running `takenote sync`.");
    }
    Ok(())
}

/// Apply `config init` flags on top of the profile's current remote
pub fn merge_remote(
    existing: Option<RemoteConfig>,
    args: RemoteArgs,
) -> Result<Option<RemoteConfig>, CliError> {
    let kind = args.kind.or(match &existing {
        Some(RemoteConfig::File { .. }) => Some(RemoteKind::File),
        Some(RemoteConfig::Gist { .. }) => Some(RemoteKind::Gist),
        None if args.path.is_some() => Some(RemoteKind::File),
        None if args.gist_id.is_some() => Some(RemoteKind::Gist),
        None => None,
    });

    let remote = match kind {
        None => return Ok(None),
        Some(RemoteKind::File) => {
            let previous = match existing {
                Some(RemoteConfig::File { path }) => Some(path),
                _ => None,
            };
            let path = args.path.or(previous).ok_or_else(|| {
                CliError::Config("a file remote needs --path".to_string())
            })?;
            RemoteConfig::File { path }
        }
        Some(RemoteKind::Gist) => {
            let (previous_id, previous_base, previous_file) = match existing {
                Some(RemoteConfig::Gist {
                    gist_id,
                    api_base_url,
                    file_name,
                }) => (Some(gist_id), Some(api_base_url), Some(file_name)),
                _ => (None, None, None),
            };
            let gist_id = normalize_text_option(args.gist_id)
                .or(previous_id)
                .ok_or_else(|| CliError::Config("a gist remote needs --gist-id".to_string()))?;
            RemoteConfig::Gist {
                gist_id,
                api_base_url: normalize_text_option(args.api_base_url)
                    .or(previous_base)
                    .unwrap_or_else(|| DEFAULT_GIST_API_BASE_URL.to_string()),
                file_name: normalize_text_option(args.file_name)
                    .or(previous_file)
                    .unwrap_or_else(|| DEFAULT_SNAPSHOT_FILE_NAME.to_string()),
            }
        }
    };

    remote
        .normalized()
        .map(Some)
        .map_err(|error| CliError::Config(error.to_string()))
}

pub fn run_config_show(profile_name: Option<&str>) -> Result<(), CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(profile_name);
    let profile = config.profile(&profile_name).cloned().unwrap_or_default();

    println!("profile: {profile_name}");
    println!("{}", serde_json::to_string_pretty(&profile)?);
    if matches!(profile.remote, Some(RemoteConfig::Gist { .. })) {
        let token_state = if github_token().is_some() { "set" } else { "missing" };
        println!("{GITHUB_TOKEN_ENV}: {token_state}");
    }
    Ok(())
}
