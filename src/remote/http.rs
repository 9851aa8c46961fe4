//! HTTP implementation of the document store seam
//!
//! Routes are `{base}/{type}` for list/create and `{base}/{type}/{id}` for
//! replace/patch/delete. List responses may be a bare JSON array or an
//! envelope carrying the array under `data` or `items`; both shapes are
//! accepted. HTTP statuses are folded into the [`StoreError`] taxonomy.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{Map, Value as JsonValue};

use super::{DocumentStore, StoreError};
use crate::record::RawRecord;

/// Configuration for [`HttpDocumentStore`].
#[derive(Debug, Clone)]
pub struct HttpStoreConfig {
    /// Base URL of the document API, without a trailing slash.
    pub base_url: String,
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpStoreConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".into(),
            timeout: Duration::from_secs(30),
            user_agent: concat!("monorec/", env!("CARGO_PKG_VERSION")).into(),
        }
    }
}

/// Document store backed by a remote HTTP API.
pub struct HttpDocumentStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDocumentStore {
    pub fn new(config: HttpStoreConfig) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| StoreError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn collection_url(&self, document_type: &str) -> String {
        format!("{}/{}", self.base_url, document_type)
    }

    fn document_url(&self, document_type: &str, id: &str) -> String {
        format!("{}/{}/{}", self.base_url, document_type, id)
    }

    /// Check the status and read the body; map non-success statuses into the
    /// error taxonomy.
    async fn read_body(response: reqwest::Response) -> Result<JsonValue, StoreError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(error_for_status(status, body));
        }
        if body.trim().is_empty() {
            return Ok(JsonValue::Null);
        }
        serde_json::from_str(&body).map_err(|e| StoreError::Payload(e.to_string()))
    }

    async fn read_record(response: reqwest::Response) -> Result<RawRecord, StoreError> {
        let body = Self::read_body(response).await?;
        RawRecord::from_value(body).map_err(|e| StoreError::Payload(e.to_string()))
    }
}

#[async_trait]
impl DocumentStore for HttpDocumentStore {
    async fn list(&self, document_type: &str) -> Result<Vec<RawRecord>, StoreError> {
        let response = self
            .client
            .get(self.collection_url(document_type))
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;

        parse_list_body(Self::read_body(response).await?)
    }

    async fn create(
        &self,
        document_type: &str,
        record: &RawRecord,
    ) -> Result<RawRecord, StoreError> {
        let response = self
            .client
            .post(self.collection_url(document_type))
            .json(record)
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;

        Self::read_record(response).await
    }

    async fn replace(
        &self,
        document_type: &str,
        id: &str,
        record: &RawRecord,
    ) -> Result<RawRecord, StoreError> {
        let response = self
            .client
            .put(self.document_url(document_type, id))
            .json(record)
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;

        Self::read_record(response).await
    }

    async fn patch(
        &self,
        document_type: &str,
        id: &str,
        fields: &Map<String, JsonValue>,
    ) -> Result<RawRecord, StoreError> {
        let response = self
            .client
            .patch(self.document_url(document_type, id))
            .json(fields)
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;

        Self::read_record(response).await
    }

    async fn delete(&self, document_type: &str, id: &str) -> Result<(), StoreError> {
        let response = self
            .client
            .delete(self.document_url(document_type, id))
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;

        Self::read_body(response).await.map(|_| ())
    }
}

fn error_for_status(status: StatusCode, body: String) -> StoreError {
    match status {
        StatusCode::NOT_FOUND => StoreError::NotFound,
        StatusCode::METHOD_NOT_ALLOWED | StatusCode::NOT_IMPLEMENTED => {
            StoreError::MethodNotAllowed
        }
        StatusCode::CONFLICT => StoreError::Conflict(body),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => StoreError::Rejected(body),
        other => StoreError::Network(format!("unexpected status {other}: {body}")),
    }
}

/// Accept either a bare array or a `data`/`items` envelope.
fn parse_list_body(body: JsonValue) -> Result<Vec<RawRecord>, StoreError> {
    let items = match body {
        JsonValue::Array(items) => items,
        JsonValue::Object(mut envelope) => {
            match envelope.remove("data").or_else(|| envelope.remove("items")) {
                Some(JsonValue::Array(items)) => items,
                _ => {
                    return Err(StoreError::Payload(
                        "list response is neither an array nor a data/items envelope".into(),
                    ))
                }
            }
        }
        other => {
            return Err(StoreError::Payload(format!(
                "list response is not a collection: {other}"
            )))
        }
    };

    items
        .into_iter()
        .map(|v| RawRecord::from_value(v).map_err(|e| StoreError::Payload(e.to_string())))
        .collect()
}
