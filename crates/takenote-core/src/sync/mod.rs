//! Sync coordinator: fetch, merge, push, commit.
//!
//! At most one sync runs at a time. A request made while a sync is in
//! flight joins it and receives the same outcome. The job runs on its own
//! task, so a caller that stops waiting cannot leave the coordinator stuck
//! in [`SyncState::Syncing`].

mod file;
mod gateway;
mod gist;

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;

pub use file::FileGateway;
pub use gateway::{MemoryGateway, RemoteGateway};
pub use gist::GistGateway;

use crate::config::SyncSettings;
use crate::merge::{merge, MergeOptions};
use crate::models::{SyncConflict, SyncSnapshot};
use crate::state::{SyncState, SyncStatus};
use crate::store::EntityStore;
use crate::util::unix_millis_now;

/// Why a sync attempt failed. Local state is untouched in every case.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("Remote rejected the credentials: {0}")]
    Unauthorized(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Remote snapshot not found: {0}")]
    NotFound(String),
    #[error("Remote did not answer within {0} seconds")]
    Timeout(u64),
    #[error("Remote snapshot changed during sync: {0}")]
    Conflict(String),
    #[error("Remote snapshot is unreadable: {0}")]
    Malformed(String),
}

impl SyncError {
    pub(crate) fn version_mismatch(expected: u64, actual: u64) -> Self {
        Self::Conflict(format!("expected version {expected}, found {actual}"))
    }
}

/// Summary of one successful sync
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Version the remote holds after the sync
    pub remote_version: u64,
    /// Whether a new snapshot was written
    pub pushed: bool,
    pub adopted: usize,
    pub removed: usize,
    pub conflicts: Vec<SyncConflict>,
    /// Unix ms
    pub finished_at: i64,
}

/// Shared result handed to every caller of one sync attempt
pub type SyncOutcome = Result<SyncReport, SyncError>;

type InFlight = watch::Receiver<Option<SyncOutcome>>;

/// Runs syncs of one [`EntityStore`] against one [`RemoteGateway`]
#[derive(Clone)]
pub struct SyncCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<tokio::sync::Mutex<EntityStore>>,
    gateway: Arc<dyn RemoteGateway>,
    settings: SyncSettings,
    status: Mutex<SyncStatus>,
    in_flight: Mutex<Option<InFlight>>,
    conflict_log: Mutex<Vec<SyncConflict>>,
}

impl SyncCoordinator {
    pub fn new(
        store: Arc<tokio::sync::Mutex<EntityStore>>,
        gateway: Arc<dyn RemoteGateway>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                gateway,
                settings,
                status: Mutex::new(SyncStatus::default()),
                in_flight: Mutex::new(None),
                conflict_log: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Seed the status with a previously persisted sync time
    #[must_use]
    pub fn with_last_synced_at(self, last_synced_at: Option<i64>) -> Self {
        lock(&self.inner.status).last_synced_at = last_synced_at;
        self
    }

    /// Store shared with the UI layer
    pub fn store(&self) -> Arc<tokio::sync::Mutex<EntityStore>> {
        Arc::clone(&self.inner.store)
    }

    pub fn status(&self) -> SyncStatus {
        lock(&self.inner.status).clone()
    }

    /// Every conflict resolved by this coordinator, oldest first
    pub fn conflicts(&self) -> Vec<SyncConflict> {
        lock(&self.inner.conflict_log).clone()
    }

    pub fn gateway(&self) -> &dyn RemoteGateway {
        self.inner.gateway.as_ref()
    }

    /// Start a sync, or join the one already running, and wait for its
    /// outcome
    pub async fn request_sync(&self) -> SyncOutcome {
        let mut receiver = self.join_or_start();
        let outcome = match receiver.wait_for(Option::is_some).await {
            Ok(outcome) => outcome
                .clone()
                .unwrap_or_else(|| Err(SyncError::Network("sync produced no outcome".into()))),
            Err(_) => Err(SyncError::Network(
                "sync task stopped before finishing".into(),
            )),
        };
        outcome
    }

    fn join_or_start(&self) -> InFlight {
        let mut in_flight = lock(&self.inner.in_flight);
        if let Some(receiver) = in_flight.as_ref() {
            tracing::debug!("Joining sync already in flight");
            return receiver.clone();
        }

        let (sender, receiver) = watch::channel(None);
        *in_flight = Some(receiver.clone());
        lock(&self.inner.status).state = SyncState::Syncing;

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let job = tokio::spawn({
                let inner = Arc::clone(&inner);
                async move { inner.run().await }
            });
            let outcome = match job.await {
                Ok(outcome) => outcome,
                Err(error) => {
                    tracing::error!(%error, "Sync job aborted");
                    inner.store.lock().await.abort_capture();
                    Err(SyncError::Network(format!("sync job aborted: {error}")))
                }
            };
            inner.finish(&outcome);
            sender.send_replace(Some(outcome));
        });
        receiver
    }
}

impl std::fmt::Debug for SyncCoordinator {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SyncCoordinator")
            .field("gateway", &self.inner.gateway.describe())
            .field("settings", &self.inner.settings)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl Inner {
    async fn run(&self) -> SyncOutcome {
        tracing::info!(remote = %self.gateway.describe(), "Starting sync");

        let fetched = self.bounded(self.gateway.fetch_snapshot()).await;

        let (local, captured, known_version) = {
            let mut store = self.store.lock().await;
            let (local, captured) = store.capture();
            (local, captured, store.remote_version())
        };
        let (remote, republish) = match (fetched, known_version) {
            (Ok(snapshot), Some(known)) if snapshot.version < known => {
                tracing::warn!(
                    remote_version = snapshot.version,
                    known_version = known,
                    "Remote snapshot is older than the last one merged, republishing local state"
                );
                (snapshot, true)
            }
            (Ok(snapshot), _) => (snapshot, false),
            (Err(SyncError::NotFound(location)), None) => {
                tracing::info!(%location, "No remote snapshot yet, treating as empty");
                (SyncSnapshot::empty(), false)
            }
            (Err(SyncError::NotFound(location)), Some(known)) => {
                tracing::warn!(
                    %location,
                    known_version = known,
                    "Remote snapshot is gone, republishing local state"
                );
                (SyncSnapshot::empty(), true)
            }
            (Err(error), _) => {
                self.store.lock().await.abort_capture();
                return Err(error);
            }
        };

        // Against a remote that lost history, untouched local entities count
        // as local edits.
        let changes = if republish {
            captured.with_untracked(&local)
        } else {
            captured.clone()
        };
        let now = unix_millis_now();
        let outcome = merge(
            &local,
            &changes,
            &remote,
            MergeOptions {
                now,
                tombstone_retention_ms: self.settings.tombstone_retention_ms(),
            },
        );

        let pushed = outcome.needs_push();
        if pushed {
            let push = self
                .bounded(self.gateway.push_snapshot(&outcome.snapshot, remote.version))
                .await;
            if let Err(error) = push {
                self.store.lock().await.abort_capture();
                return Err(error);
            }
        } else {
            tracing::debug!("Remote already up to date, skipping push");
        }

        let fingerprints = outcome.pushed_fingerprints();
        let remote_version = if pushed {
            outcome.snapshot.version
        } else {
            remote.version
        };
        self.store.lock().await.commit_merge(
            outcome.entities,
            &captured,
            &fingerprints,
            remote_version,
            now,
        );

        Ok(SyncReport {
            remote_version,
            pushed,
            adopted: outcome.adopted,
            removed: outcome.removed,
            conflicts: outcome.conflicts,
            finished_at: now,
        })
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, SyncError>>,
    ) -> Result<T, SyncError> {
        tokio::time::timeout(self.settings.timeout(), call)
            .await
            .map_err(|_| SyncError::Timeout(self.settings.timeout_secs))?
    }

    fn finish(&self, outcome: &SyncOutcome) {
        let mut status = lock(&self.status);
        status.state = SyncState::Idle;
        match outcome {
            Ok(report) => {
                tracing::info!(
                    remote_version = report.remote_version,
                    pushed = report.pushed,
                    adopted = report.adopted,
                    removed = report.removed,
                    conflicts = report.conflicts.len(),
                    "Sync finished"
                );
                lock(&self.conflict_log).extend(report.conflicts.iter().cloned());
                status.last_synced_at = Some(report.finished_at);
                status.last_error = None;
                status.last_report = Some(report.clone());
            }
            Err(error) => {
                tracing::warn!(%error, "Sync failed");
                status.last_error = Some(error.to_string());
            }
        }
        drop(status);
        *lock(&self.in_flight) = None;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests;
