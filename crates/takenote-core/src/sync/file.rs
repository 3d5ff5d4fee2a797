//! Snapshot stored as a JSON file on a local or mounted filesystem

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{RemoteGateway, SyncError};
use crate::models::SyncSnapshot;

#[derive(Debug, Clone)]
pub struct FileGateway {
    path: PathBuf,
}

impl FileGateway {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<Option<SyncSnapshot>, SyncError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(io_error(&self.path, &error)),
        };
        SyncSnapshot::from_json(&raw)
            .map(Some)
            .map_err(|error| SyncError::Malformed(format!("{}: {error}", self.path.display())))
    }
}

#[async_trait]
impl RemoteGateway for FileGateway {
    async fn fetch_snapshot(&self) -> Result<SyncSnapshot, SyncError> {
        self.read()
            .await?
            .ok_or_else(|| SyncError::NotFound(self.path.display().to_string()))
    }

    async fn push_snapshot(
        &self,
        snapshot: &SyncSnapshot,
        expected_version: u64,
    ) -> Result<(), SyncError> {
        let actual = self.read().await?.map_or(0, |current| current.version);
        if actual != expected_version {
            return Err(SyncError::version_mismatch(expected_version, actual));
        }

        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|error| io_error(parent, &error))?;
        }
        let json = snapshot
            .to_json()
            .map_err(|error| SyncError::Malformed(error.to_string()))?;

        // Stage next to the target, then rename over it.
        let staging = self.path.with_extension("json.tmp");
        tokio::fs::write(&staging, json)
            .await
            .map_err(|error| io_error(&staging, &error))?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .map_err(|error| io_error(&self.path, &error))?;

        tracing::debug!(
            path = %self.path.display(),
            version = snapshot.version,
            "Wrote snapshot file"
        );
        Ok(())
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}

fn io_error(path: &Path, error: &std::io::Error) -> SyncError {
    match error.kind() {
        ErrorKind::PermissionDenied => {
            SyncError::Unauthorized(format!("{}: {error}", path.display()))
        }
        _ => SyncError::Network(format!("{}: {error}", path.display())),
    }
}
