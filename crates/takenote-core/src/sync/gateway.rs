//! Remote snapshot storage interface

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use super::SyncError;
use crate::models::SyncSnapshot;

/// Where the shared snapshot lives.
///
/// Implementations only move whole snapshots; merging happens in the
/// coordinator.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// Read the current snapshot.
    ///
    /// Returns [`SyncError::NotFound`] when nothing has been published yet.
    async fn fetch_snapshot(&self) -> Result<SyncSnapshot, SyncError>;

    /// Replace the snapshot, provided the remote still holds
    /// `expected_version`.
    async fn push_snapshot(
        &self,
        snapshot: &SyncSnapshot,
        expected_version: u64,
    ) -> Result<(), SyncError>;

    /// Short human-readable location, e.g. for `sync status`
    fn describe(&self) -> String;
}

/// In-process gateway, for tests and for wiring several stores together
#[derive(Debug, Default)]
pub struct MemoryGateway {
    snapshot: Mutex<Option<SyncSnapshot>>,
    fetch_failure: Mutex<Option<SyncError>>,
    push_failure: Mutex<Option<SyncError>>,
    fetch_delay: Mutex<Option<Duration>>,
    push_delay: Mutex<Option<Duration>>,
    fetches: AtomicUsize,
    pushes: AtomicUsize,
}

impl MemoryGateway {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_snapshot(snapshot: SyncSnapshot) -> Self {
        let gateway = Self::default();
        *lock(&gateway.snapshot) = Some(snapshot);
        gateway
    }

    /// Currently published snapshot
    #[must_use]
    pub fn snapshot(&self) -> Option<SyncSnapshot> {
        lock(&self.snapshot).clone()
    }

    /// Fail the next fetch with `error`
    pub fn fail_next_fetch(&self, error: SyncError) {
        *lock(&self.fetch_failure) = Some(error);
    }

    /// Fail the next push with `error`
    pub fn fail_next_push(&self, error: SyncError) {
        *lock(&self.push_failure) = Some(error);
    }

    pub fn set_fetch_delay(&self, delay: Option<Duration>) {
        *lock(&self.fetch_delay) = delay;
    }

    pub fn set_push_delay(&self, delay: Option<Duration>) {
        *lock(&self.push_delay) = delay;
    }

    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn push_count(&self) -> usize {
        self.pushes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteGateway for MemoryGateway {
    async fn fetch_snapshot(&self) -> Result<SyncSnapshot, SyncError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let delay = *lock(&self.fetch_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = lock(&self.fetch_failure).take() {
            return Err(error);
        }
        lock(&self.snapshot)
            .clone()
            .ok_or_else(|| SyncError::NotFound("memory".to_string()))
    }

    async fn push_snapshot(
        &self,
        snapshot: &SyncSnapshot,
        expected_version: u64,
    ) -> Result<(), SyncError> {
        self.pushes.fetch_add(1, Ordering::SeqCst);
        let delay = *lock(&self.push_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = lock(&self.push_failure).take() {
            return Err(error);
        }

        let mut current = lock(&self.snapshot);
        let actual = current.as_ref().map_or(0, |snapshot| snapshot.version);
        if actual != expected_version {
            return Err(SyncError::version_mismatch(expected_version, actual));
        }
        *current = Some(snapshot.clone());
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
