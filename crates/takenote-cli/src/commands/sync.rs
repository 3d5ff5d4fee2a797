use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use takenote_core::config::{RemoteConfig, SyncSettings};
use takenote_core::db::LocalRepository;
use takenote_core::sync::{FileGateway, GistGateway};
use takenote_core::{RemoteGateway, SyncCoordinator, SyncReport};
use tokio::sync::Mutex;

use crate::commands::common::{
    format_sync_conflict_lines, format_sync_timestamp, open_database, sync_conflict_to_item,
    SyncConflictItem,
};
use crate::config_profiles::{github_token, CliProfilesConfig};
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct SyncStatusItem {
    profile: String,
    remote: Option<String>,
    last_synced_at: Option<i64>,
    last_synced_at_iso: Option<String>,
    remote_version: Option<u64>,
    pending_changes: usize,
}

/// Remote and tuning for the selected profile
pub fn resolve_remote(profile: Option<&str>) -> Result<(RemoteConfig, SyncSettings), CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(profile);
    let Some(profile) = config.profile(&profile_name) else {
        return Err(CliError::SyncNotConfigured);
    };
    let Some(remote) = profile.remote.clone() else {
        return Err(CliError::SyncNotConfigured);
    };
    tracing::debug!(profile = %profile_name, remote = remote.kind(), "Resolved sync remote");
    Ok((remote, profile.sync))
}

pub fn build_gateway(remote: &RemoteConfig) -> Result<Arc<dyn RemoteGateway>, CliError> {
    match remote {
        RemoteConfig::File { path } => Ok(Arc::new(FileGateway::new(path.clone()))),
        RemoteConfig::Gist {
            gist_id,
            api_base_url,
            file_name,
        } => Ok(Arc::new(GistGateway::new(
            api_base_url.clone(),
            gist_id.clone(),
            file_name.clone(),
            github_token(),
        )?)),
    }
}

pub async fn run_sync(profile: Option<&str>, db_path: &Path) -> Result<(), CliError> {
    let (remote, settings) = resolve_remote(profile)?;
    let gateway = build_gateway(&remote)?;
    let report = sync_database(gateway, settings, db_path).await?;

    println!("{}", format_sync_report(&report));
    for line in format_sync_conflict_lines(&report.conflicts) {
        println!("  {line}");
    }
    Ok(())
}

/// Run one sync of the local database against `gateway` and persist the
/// result. Nothing is written locally when the sync fails.
pub async fn sync_database(
    gateway: Arc<dyn RemoteGateway>,
    settings: SyncSettings,
    db_path: &Path,
) -> Result<SyncReport, CliError> {
    let db = open_database(db_path)?;
    let repo = db.repository();
    let meta = repo.sync_meta()?;
    let store = repo.load_store()?;

    let coordinator = SyncCoordinator::new(Arc::new(Mutex::new(store)), gateway, settings)
        .with_last_synced_at(meta.last_synced_at);
    let report = coordinator.request_sync().await?;

    let store = coordinator.store();
    let store = store.lock().await;
    repo.save_store(&store)?;
    repo.record_sync(&report)?;
    Ok(report)
}

pub fn format_sync_report(report: &SyncReport) -> String {
    let mut summary = format!(
        "Sync completed at remote version {}: {} adopted, {} removed",
        report.remote_version, report.adopted, report.removed
    );
    if report.pushed {
        summary.push_str(", local changes published");
    }
    if !report.conflicts.is_empty() {
        summary.push_str(&format!(", {} conflict(s) resolved", report.conflicts.len()));
    }
    summary
}

pub fn run_sync_status(
    profile: Option<&str>,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(profile);
    let remote = config
        .profile(&profile_name)
        .and_then(|profile| profile.remote.as_ref())
        .map(|remote| build_gateway(remote).map(|gateway| gateway.describe()))
        .transpose()?;

    let db = open_database(db_path)?;
    let repo = db.repository();
    let meta = repo.sync_meta()?;
    let pending_changes = repo.load_store()?.pending_changes().len();

    let status = SyncStatusItem {
        profile: profile_name,
        remote,
        last_synced_at: meta.last_synced_at,
        last_synced_at_iso: meta.last_synced_at.map(format_sync_timestamp),
        remote_version: meta.remote_version,
        pending_changes,
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("profile:         {}", status.profile);
    println!(
        "remote:          {}",
        status.remote.as_deref().unwrap_or("not configured")
    );
    println!(
        "last synced:     {}",
        status.last_synced_at_iso.as_deref().unwrap_or("never")
    );
    if let Some(version) = status.remote_version {
        println!("remote version:  {version}");
    }
    println!("pending changes: {}", status.pending_changes);
    Ok(())
}

pub fn run_sync_conflicts(limit: usize, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path)?;
    let conflicts = db.repository().list_conflicts(limit)?;

    if as_json {
        let json_items = conflicts
            .iter()
            .map(sync_conflict_to_item)
            .collect::<Vec<SyncConflictItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if conflicts.is_empty() {
        println!("No sync conflicts recorded.");
        return Ok(());
    }

    for line in format_sync_conflict_lines(&conflicts) {
        println!("{line}");
    }
    Ok(())
}
