use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;

use super::RemoteStore;
use crate::common::Document;
use crate::config::HttpStoreConfig;
use crate::error::StoreError;

/// Document store reached over plain HTTP: `GET` returns the blob, `PUT`
/// replaces it.
pub struct HttpStore {
    client: Client,
    url: String,
    auth: Option<(String, String)>,
    envelope: Option<String>,
}

/// How a response status is interpreted on read.
#[derive(Debug, PartialEq, Eq)]
enum ReadStatus {
    Present,
    Absent,
    Failed(StoreError),
}

impl HttpStore {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
            auth: None,
            envelope: None,
        }
    }

    pub fn from_config(config: &HttpStoreConfig) -> Result<Self, StoreError> {
        if config.url.trim().is_empty() {
            return Err(StoreError::Storage(
                "http backend selected but no store url configured".to_string(),
            ));
        }

        let mut store = Self::new(config.url.trim());
        if let Some(key) = config.api_key.as_deref().filter(|key| !key.is_empty()) {
            store = store.with_auth(&config.auth_header, key);
        }
        if let Some(envelope) = config.envelope.as_deref().filter(|env| !env.is_empty()) {
            store = store.with_envelope(envelope);
        }
        Ok(store)
    }

    pub fn with_auth(mut self, header: &str, value: &str) -> Self {
        self.auth = Some((header.to_string(), value.to_string()));
        self
    }

    /// Reads unwrap the document from this key when present, e.g. `record`.
    pub fn with_envelope(mut self, key: &str) -> Self {
        self.envelope = Some(key.to_string());
        self
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            Some((header, value)) => request.header(header, value),
            None => request,
        }
    }
}

fn read_status(status: StatusCode) -> ReadStatus {
    match status.as_u16() {
        200..=299 => ReadStatus::Present,
        // Some services answer 400 for a document that was never created.
        400 | 404 => ReadStatus::Absent,
        429 => ReadStatus::Failed(StoreError::RateLimited(429)),
        other => ReadStatus::Failed(StoreError::Status(other)),
    }
}

fn write_status(status: StatusCode) -> Result<(), StoreError> {
    match status.as_u16() {
        200..=299 => Ok(()),
        429 => Err(StoreError::RateLimited(429)),
        other => Err(StoreError::Status(other)),
    }
}

fn unwrap_envelope(value: Value, envelope: Option<&str>) -> Value {
    match (value, envelope) {
        (Value::Object(mut map), Some(key)) if map.contains_key(key) => {
            map.remove(key).unwrap_or(Value::Null)
        }
        (value, _) => value,
    }
}

fn network_error(err: reqwest::Error) -> StoreError {
    StoreError::Network(err.to_string())
}

#[async_trait]
impl RemoteStore for HttpStore {
    async fn read(&self) -> Result<Option<Document>, StoreError> {
        let response = self
            .authorize(self.client.get(&self.url))
            .send()
            .await
            .map_err(network_error)?;

        match read_status(response.status()) {
            ReadStatus::Present => {}
            ReadStatus::Absent => {
                log::debug!("Document at {} does not exist yet", self.url);
                return Ok(None);
            }
            ReadStatus::Failed(err) => {
                log::warn!("Store read failed: {err}");
                return Err(err);
            }
        }

        let body = response.bytes().await.map_err(network_error)?;
        let value: Value = serde_json::from_slice(&body).map_err(|err| {
            log::error!("Failed to parse store response: {err}");
            StoreError::Malformed(err.to_string())
        })?;
        Document::from_value(unwrap_envelope(value, self.envelope.as_deref())).map(Some)
    }

    async fn write(&self, document: &Document) -> Result<(), StoreError> {
        let response = self
            .authorize(self.client.put(&self.url))
            .json(document)
            .send()
            .await
            .map_err(network_error)?;

        write_status(response.status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn read_status_maps_absent_and_rate_limit() {
        assert_eq!(read_status(StatusCode::OK), ReadStatus::Present);
        assert_eq!(read_status(StatusCode::BAD_REQUEST), ReadStatus::Absent);
        assert_eq!(read_status(StatusCode::NOT_FOUND), ReadStatus::Absent);
        assert_eq!(
            read_status(StatusCode::TOO_MANY_REQUESTS),
            ReadStatus::Failed(StoreError::RateLimited(429))
        );
        assert_eq!(
            read_status(StatusCode::INTERNAL_SERVER_ERROR),
            ReadStatus::Failed(StoreError::Status(500))
        );
    }

    #[test]
    fn write_status_treats_only_2xx_as_success() {
        assert!(write_status(StatusCode::NO_CONTENT).is_ok());
        assert_eq!(
            write_status(StatusCode::TOO_MANY_REQUESTS),
            Err(StoreError::RateLimited(429))
        );
        assert_eq!(
            write_status(StatusCode::NOT_FOUND),
            Err(StoreError::Status(404))
        );
    }

    #[test]
    fn envelope_is_unwrapped_only_when_present() {
        let wrapped = json!({"record": {"alice": []}, "metadata": {}});
        assert_eq!(
            unwrap_envelope(wrapped, Some("record")),
            json!({"alice": []})
        );

        let bare = json!({"alice": []});
        assert_eq!(unwrap_envelope(bare.clone(), Some("record")), bare);
        assert_eq!(unwrap_envelope(bare.clone(), None), bare);
    }

    #[test]
    fn config_without_url_is_rejected() {
        let config = HttpStoreConfig::default();
        assert!(matches!(
            HttpStore::from_config(&config),
            Err(StoreError::Storage(_))
        ));
    }

    #[test]
    fn config_sets_auth_and_envelope() {
        let config = HttpStoreConfig {
            url: "https://example.invalid/b/123".to_string(),
            auth_header: "X-Access-Key".to_string(),
            api_key: Some("secret".to_string()),
            envelope: Some("record".to_string()),
        };
        let store = HttpStore::from_config(&config).unwrap();
        assert_eq!(
            store.auth,
            Some(("X-Access-Key".to_string(), "secret".to_string()))
        );
        assert_eq!(store.envelope.as_deref(), Some("record"));
    }
}
