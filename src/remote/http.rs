//! HTTP adapter for the user-data API.
//!
//! Endpoints, relative to the configured base URL:
//! - `GET  /ping`
//! - `GET  /users/{id}/exists` -> `{success, exists, lastModified?}`
//! - `GET  /users/{id}/data`   -> `{success, data}`, or 404 when no record exists
//! - `POST /users/{id}/data`   with `{userData}` -> `{success, lastModified}`

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::RemoteStore;
use crate::codec::{decode_document, encode_document, wire_time};
use crate::error::{SyncError, SyncResult};
use crate::record::UserRecord;

/// Connection settings for [`HttpRemoteStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpRemoteConfig {
    /// API root, e.g. `https://example.com/api`
    pub base_url: String,
    #[serde(default)]
    pub user_agent: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExistsResponse {
    success: bool,
    #[serde(default)]
    exists: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DataResponse {
    success: bool,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    last_modified: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SaveRequest<'a> {
    user_data: &'a Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaveResponse {
    success: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    last_modified: Option<String>,
}

/// Remote store speaking the user-data HTTP API.
#[derive(Debug, Clone)]
pub struct HttpRemoteStore {
    client: Client,
    base_url: Url,
}

impl HttpRemoteStore {
    pub fn new(config: &HttpRemoteConfig) -> SyncResult<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            SyncError::RemoteOperation(format!("invalid base url {}: {}", config.base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(SyncError::RemoteOperation(format!(
                "base url {} cannot carry a path",
                config.base_url
            )));
        }

        let mut builder = Client::builder();
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        let client = builder
            .build()
            .map_err(|e| SyncError::RemoteOperation(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, base_url })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn user_endpoint(&self, user_id: &str, leaf: &str) -> Url {
        self.endpoint(&["users", user_id, leaf])
    }
}

/// A request that never reached the server is a connectivity failure.
fn remote_error(operation: &str, err: reqwest::Error) -> SyncError {
    let message = format!("{} request failed: {}", operation, err);
    if err.is_connect() || err.is_timeout() || err.is_request() {
        SyncError::Connectivity(message)
    } else {
        SyncError::RemoteOperation(message)
    }
}

fn malformed(operation: &str, err: reqwest::Error) -> SyncError {
    SyncError::RemoteOperation(format!("malformed {} response: {}", operation, err))
}

fn rejected(operation: &str, error: Option<String>) -> SyncError {
    SyncError::RemoteOperation(error.unwrap_or_else(|| format!("{} rejected by server", operation)))
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn ping(&self) -> SyncResult<()> {
        let response = self
            .client
            .get(self.endpoint(&["ping"]))
            .send()
            .await
            .map_err(|e| SyncError::Connectivity(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(SyncError::Connectivity(format!(
                "ping returned {}",
                response.status()
            )))
        }
    }

    async fn exists(&self, user_id: &str) -> SyncResult<bool> {
        let body: ExistsResponse = self
            .client
            .get(self.user_endpoint(user_id, "exists"))
            .send()
            .await
            .map_err(|e| remote_error("exists", e))?
            .json()
            .await
            .map_err(|e| malformed("exists", e))?;

        if !body.success {
            return Err(rejected("exists", body.error));
        }
        debug!(user_id, exists = body.exists, "Checked cloud copy");
        Ok(body.exists)
    }

    async fn download(&self, user_id: &str) -> SyncResult<Option<UserRecord>> {
        let response = self
            .client
            .get(self.user_endpoint(user_id, "data"))
            .send()
            .await
            .map_err(|e| remote_error("download", e))?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!(user_id, "No cloud copy yet");
            return Ok(None);
        }

        let body: DataResponse = response.json().await.map_err(|e| malformed("download", e))?;
        if !body.success {
            return Err(rejected("download", body.error));
        }

        let Some(data) = body.data.filter(|d| !d.is_null()) else {
            return Ok(None);
        };
        let mut record = decode_document(data)?;
        if record.last_modified.is_none() {
            record.last_modified = body.last_modified.as_deref().and_then(wire_time::parse);
        }
        Ok(Some(record))
    }

    async fn upload(
        &self,
        user_id: &str,
        record: &UserRecord,
        device_id: &str,
    ) -> SyncResult<Option<DateTime<Utc>>> {
        let document = encode_document(record, device_id)?;
        let body: SaveResponse = self
            .client
            .post(self.user_endpoint(user_id, "data"))
            .json(&SaveRequest {
                user_data: &document,
            })
            .send()
            .await
            .map_err(|e| remote_error("upload", e))?
            .json()
            .await
            .map_err(|e| malformed("upload", e))?;

        if !body.success {
            return Err(rejected("upload", body.error));
        }
        Ok(body.last_modified.as_deref().and_then(wire_time::parse))
    }
}
