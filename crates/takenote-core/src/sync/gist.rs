//! GitHub gist holding the snapshot as a single file.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::{RemoteGateway, SyncError};
use crate::models::SyncSnapshot;
use crate::util::{compact_text, normalize_text_option};

const GITHUB_ACCEPT: &str = "application/vnd.github+json";
const GITHUB_API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = concat!("takenote/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Clone)]
pub struct GistGateway {
    api_base_url: String,
    gist_id: String,
    file_name: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for GistGateway {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("GistGateway")
            .field("api_base_url", &self.api_base_url)
            .field("gist_id", &self.gist_id)
            .field("file_name", &self.file_name)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl GistGateway {
    pub fn new(
        api_base_url: impl Into<String>,
        gist_id: impl Into<String>,
        file_name: impl Into<String>,
        token: Option<String>,
    ) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|error| SyncError::Network(error.to_string()))?;
        Ok(Self {
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
            gist_id: gist_id.into(),
            file_name: file_name.into(),
            token: normalize_text_option(token),
            client,
        })
    }

    fn gist_url(&self) -> String {
        format!("{}/gists/{}", self.api_base_url, self.gist_id)
    }

    fn token(&self) -> Result<&str, SyncError> {
        self.token.as_deref().ok_or_else(|| {
            SyncError::Unauthorized("a GitHub token is required for gist sync".to_string())
        })
    }

    async fn fetch_raw(&self, url: &str, token: &str) -> Result<String, SyncError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(network_error)?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        response.text().await.map_err(network_error)
    }
}

#[async_trait]
impl RemoteGateway for GistGateway {
    async fn fetch_snapshot(&self) -> Result<SyncSnapshot, SyncError> {
        let token = self.token()?;
        let response = self
            .client
            .get(self.gist_url())
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, GITHUB_ACCEPT)
            .header("X-GitHub-Api-Version", GITHUB_API_VERSION)
            .send()
            .await
            .map_err(network_error)?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        let gist = response
            .json::<GistResponse>()
            .await
            .map_err(|error| SyncError::Malformed(error.to_string()))?;

        let file = gist.files.get(&self.file_name).ok_or_else(|| {
            SyncError::NotFound(format!("{} in gist {}", self.file_name, self.gist_id))
        })?;
        let content = match (&file.content, file.truncated, &file.raw_url) {
            (Some(content), false, _) => content.clone(),
            (_, _, Some(raw_url)) => self.fetch_raw(raw_url, token).await?,
            (None, _, None) | (Some(_), true, None) => {
                return Err(SyncError::Malformed(format!(
                    "gist file {} has no readable content",
                    self.file_name
                )))
            }
        };

        SyncSnapshot::from_json(&content).map_err(|error| SyncError::Malformed(error.to_string()))
    }

    /// Gists have no conditional update, so the version is re-read right
    /// before writing.
    async fn push_snapshot(
        &self,
        snapshot: &SyncSnapshot,
        expected_version: u64,
    ) -> Result<(), SyncError> {
        let token = self.token()?;
        let actual = match self.fetch_snapshot().await {
            Ok(current) => current.version,
            Err(SyncError::NotFound(_)) => 0,
            Err(error) => return Err(error),
        };
        if actual != expected_version {
            return Err(SyncError::version_mismatch(expected_version, actual));
        }

        let content = snapshot
            .to_json()
            .map_err(|error| SyncError::Malformed(error.to_string()))?;
        let body = GistUpdate {
            files: BTreeMap::from([(self.file_name.as_str(), GistFileUpdate { content })]),
        };
        let response = self
            .client
            .patch(self.gist_url())
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, GITHUB_ACCEPT)
            .header("X-GitHub-Api-Version", GITHUB_API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(network_error)?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        tracing::debug!(
            gist = %self.gist_id,
            version = snapshot.version,
            "Updated gist snapshot"
        );
        Ok(())
    }

    fn describe(&self) -> String {
        format!("gist {}/{}", self.gist_id, self.file_name)
    }
}

#[derive(Debug, Deserialize)]
struct GistResponse {
    #[serde(default)]
    files: BTreeMap<String, GistFile>,
}

#[derive(Debug, Deserialize)]
struct GistFile {
    content: Option<String>,
    #[serde(default)]
    truncated: bool,
    raw_url: Option<String>,
}

#[derive(Debug, Serialize)]
struct GistUpdate<'a> {
    files: BTreeMap<&'a str, GistFileUpdate>,
}

#[derive(Debug, Serialize)]
struct GistFileUpdate {
    content: String,
}

#[derive(Debug, Deserialize)]
struct GithubErrorBody {
    message: Option<String>,
}

async fn error_from_response(response: reqwest::Response) -> SyncError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    error_for_status(status, &body)
}

fn error_for_status(status: StatusCode, body: &str) -> SyncError {
    let message = parse_api_error(status, body);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SyncError::Unauthorized(message),
        StatusCode::NOT_FOUND => SyncError::NotFound(message),
        StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => SyncError::Conflict(message),
        _ => SyncError::Network(message),
    }
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<GithubErrorBody>(body) {
        if let Some(message) = payload.message {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

fn network_error(error: reqwest::Error) -> SyncError {
    if error.is_timeout() {
        SyncError::Network(format!("request timed out: {error}"))
    } else {
        SyncError::Network(error.to_string())
    }
}
