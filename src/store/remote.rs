//! Remote data-API store client
//!
//! HTTP client for the remote record store. Work happens inside a session:
//! `POST /sessions` exchanges credentials for a bearer token and
//! `DELETE /sessions/{token}` releases it, so the store also implements
//! [`ConnectionLifecycle`]. Record reads and writes live under
//! `/tables/{table}/records`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::store::{ConnectionLifecycle, FieldMap, Record, RecordStore, SessionLease};

#[derive(Debug, Deserialize)]
struct RecordsEnvelope {
    records: Vec<Record>,
}

#[derive(Debug, Deserialize)]
struct CreatedEnvelope {
    id: String,
}

#[derive(Debug, Deserialize)]
struct SessionEnvelope {
    token: String,
}

/// Client for the remote record store's data API.
#[derive(Clone)]
pub struct RemoteStore {
    client: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
    token: Arc<RwLock<Option<String>>>,
}

impl RemoteStore {
    /// Create a client against the given API base URL.
    ///
    /// `pool_size` caps how many connections the client keeps to the store,
    /// bounding concurrent requests issued per run.
    pub fn new(
        base_url: &str,
        username: &str,
        password: &str,
        pool_size: usize,
    ) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(pool_size)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
            token: Arc::new(RwLock::new(None)),
        })
    }

    async fn bearer(&self) -> Result<String, StoreError> {
        self.token
            .read()
            .await
            .clone()
            .map(|token| format!("Bearer {token}"))
            .ok_or_else(|| StoreError::session("no session open against the remote store"))
    }

    async fn read_error(response: reqwest::Response) -> StoreError {
        let status = response.status().as_u16();
        let body = response.text().await.ok();
        StoreError::api(status, body)
    }

    async fn fetch_records(&self, request: reqwest::RequestBuilder) -> Result<Vec<Record>, StoreError> {
        let response = request
            .header("authorization", self.bearer().await?)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::read_error(response).await);
        }

        let envelope: RecordsEnvelope = response
            .json()
            .await
            .map_err(|err| StoreError::malformed(format!("invalid records payload: {err}")))?;

        Ok(envelope.records)
    }
}

#[async_trait]
impl RecordStore for RemoteStore {
    async fn fetch_modified_since(
        &self,
        table: &str,
        watermark: DateTime<Utc>,
    ) -> Result<Vec<Record>, StoreError> {
        let url = format!("{}/tables/{}/records", self.base_url, table);
        let request = self.client.get(url).query(&[(
            "modified_since",
            watermark.to_rfc3339_opts(SecondsFormat::Secs, true),
        )]);
        self.fetch_records(request).await
    }

    async fn fetch_by_ids(&self, table: &str, ids: &[String]) -> Result<Vec<Record>, StoreError> {
        let url = format!("{}/tables/{}/records/search", self.base_url, table);
        let request = self.client.post(url).json(&json!({ "ids": ids }));
        self.fetch_records(request).await
    }

    async fn snapshot(&self, table: &str) -> Result<Vec<Record>, StoreError> {
        let url = format!("{}/tables/{}/records", self.base_url, table);
        self.fetch_records(self.client.get(url)).await
    }

    async fn create(&self, table: &str, fields: &FieldMap) -> Result<String, StoreError> {
        let url = format!("{}/tables/{}/records", self.base_url, table);
        let response = self
            .client
            .post(url)
            .header("authorization", self.bearer().await?)
            .json(&json!({ "fields": fields }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::read_error(response).await);
        }

        let created: CreatedEnvelope = response
            .json()
            .await
            .map_err(|err| StoreError::malformed(format!("invalid create payload: {err}")))?;

        Ok(created.id)
    }

    async fn update(&self, table: &str, id: &str, fields: &FieldMap) -> Result<(), StoreError> {
        let url = format!("{}/tables/{}/records/{}", self.base_url, table, id);
        let response = self
            .client
            .patch(url)
            .header("authorization", self.bearer().await?)
            .json(&json!({ "fields": fields }))
            .send()
            .await?;

        match response.status().as_u16() {
            404 => Err(StoreError::NotFound { id: id.to_string() }),
            status if (200..300).contains(&status) => Ok(()),
            _ => Err(Self::read_error(response).await),
        }
    }

    async fn delete(&self, table: &str, id: &str) -> Result<(), StoreError> {
        let url = format!("{}/tables/{}/records/{}", self.base_url, table, id);
        let response = self
            .client
            .delete(url)
            .header("authorization", self.bearer().await?)
            .send()
            .await?;

        match response.status().as_u16() {
            404 => Err(StoreError::NotFound { id: id.to_string() }),
            status if (200..300).contains(&status) => Ok(()),
            _ => Err(Self::read_error(response).await),
        }
    }
}

#[async_trait]
impl ConnectionLifecycle for RemoteStore {
    async fn open(&self) -> Result<Box<dyn SessionLease>, StoreError> {
        let url = format!("{}/sessions", self.base_url);
        let response = self
            .client
            .post(url)
            .json(&json!({
                "username": self.username,
                "password": self.password,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::read_error(response).await);
        }

        let session: SessionEnvelope = response
            .json()
            .await
            .map_err(|err| StoreError::malformed(format!("invalid session payload: {err}")))?;

        debug!("remote session opened");
        *self.token.write().await = Some(session.token.clone());

        Ok(Box::new(RemoteSessionLease {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            slot: self.token.clone(),
            token: session.token,
            closed: false,
        }))
    }
}

/// A held session against the remote store.
struct RemoteSessionLease {
    client: reqwest::Client,
    base_url: String,
    slot: Arc<RwLock<Option<String>>>,
    token: String,
    closed: bool,
}

#[async_trait]
impl SessionLease for RemoteSessionLease {
    async fn close(mut self: Box<Self>) -> Result<(), StoreError> {
        self.closed = true;
        *self.slot.write().await = None;

        let url = format!("{}/sessions/{}", self.base_url, self.token);
        let response = self.client.delete(url).send().await?;

        if !response.status().is_success() {
            return Err(RemoteStore::read_error(response).await);
        }

        debug!("remote session closed");
        Ok(())
    }
}

impl Drop for RemoteSessionLease {
    fn drop(&mut self) {
        if !self.closed {
            warn!("remote session lease dropped without close; token left to expire server-side");
        }
    }
}
