use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::{BlobError, BlobResult, ObjectInfo, ObjectStore};

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const LIST_LIMIT: u32 = 1000;

/// Client for a Supabase-compatible storage REST API.
///
/// Built from a tenant's `{storageUrl, storageKey}` descriptor (or the
/// platform default). The key is sent as both bearer token and `apikey`
/// header and never appears in errors or logs.
#[derive(Clone)]
pub struct HttpObjectStore {
    base_url: String,
    http: reqwest::Client,
}

impl std::fmt::Debug for HttpObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpObjectStore")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpObjectStore {
    pub fn new(storage_url: &str, storage_key: &str) -> BlobResult<Self> {
        Self::with_timeout(storage_url, storage_key, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(storage_url: &str, storage_key: &str, timeout: Duration) -> BlobResult<Self> {
        let base_url = storage_url.trim().trim_end_matches('/');
        if base_url.is_empty() {
            return Err(BlobError::invalid("storage url is empty"));
        }
        if storage_key.trim().is_empty() {
            return Err(BlobError::invalid("storage key is empty"));
        }

        let bearer = header::HeaderValue::from_str(&format!("Bearer {}", storage_key.trim()))
            .map_err(|_| BlobError::invalid("storage key contains invalid header characters"))?;
        let apikey = header::HeaderValue::from_str(storage_key.trim())
            .map_err(|_| BlobError::invalid("storage key contains invalid header characters"))?;

        let mut headers = header::HeaderMap::new();
        headers.insert(header::AUTHORIZATION, bearer);
        headers.insert("apikey", apikey);
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(BlobError::backend)?;

        Ok(Self {
            base_url: base_url.to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn object_url(&self, bucket: &str, path: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url,
            bucket,
            path.trim_start_matches('/')
        )
    }

    async fn check(response: reqwest::Response, key: &str) -> BlobResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response
            .json::<ErrorBody>()
            .await
            .ok()
            .and_then(|body| body.message.or(body.error))
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());

        Err(match status {
            StatusCode::NOT_FOUND => BlobError::not_found(key),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BlobError::Unauthorized,
            StatusCode::BAD_REQUEST => BlobError::invalid(message),
            _ => BlobError::Request {
                status: status.as_u16(),
                message,
            },
        })
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct ListedObject {
    name: String,
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    metadata: Option<ListedMetadata>,
}

#[derive(Deserialize)]
struct ListedMetadata {
    #[serde(default)]
    size: u64,
    mimetype: Option<String>,
}

impl From<ListedObject> for ObjectInfo {
    fn from(listed: ListedObject) -> Self {
        let (size_bytes, content_type) = match listed.metadata {
            Some(meta) => (meta.size, meta.mimetype),
            None => (0, None),
        };
        Self {
            name: listed.name,
            size_bytes,
            content_type,
            updated_at: listed.updated_at,
        }
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn list(&self, bucket: &str, prefix: &str) -> BlobResult<Vec<ObjectInfo>> {
        let url = format!("{}/storage/v1/object/list/{}", self.base_url, bucket);
        let response = self
            .http
            .post(url)
            .json(&json!({ "prefix": prefix, "limit": LIST_LIMIT, "offset": 0 }))
            .send()
            .await
            .map_err(BlobError::backend)?;
        let response = Self::check(response, prefix).await?;

        let listed: Vec<ListedObject> = response.json().await.map_err(BlobError::backend)?;
        debug!(bucket, count = listed.len(), "listed objects");
        Ok(listed.into_iter().map(ObjectInfo::from).collect())
    }

    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        body: Vec<u8>,
        content_type: Option<&str>,
    ) -> BlobResult<ObjectInfo> {
        if path.trim_matches('/').is_empty() {
            return Err(BlobError::invalid("object path is empty"));
        }
        let size_bytes = body.len() as u64;
        let content_type = content_type.unwrap_or("application/octet-stream");

        let response = self
            .http
            .post(self.object_url(bucket, path))
            .header(header::CONTENT_TYPE, content_type)
            .header("x-upsert", "true")
            .body(body)
            .send()
            .await
            .map_err(BlobError::backend)?;
        Self::check(response, path).await?;

        debug!(bucket, size_bytes, "uploaded object");
        Ok(ObjectInfo {
            name: path.trim_start_matches('/').to_string(),
            size_bytes,
            content_type: Some(content_type.to_string()),
            updated_at: Some(Utc::now()),
        })
    }

    async fn remove(&self, bucket: &str, paths: &[String]) -> BlobResult<Vec<String>> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/storage/v1/object/{}", self.base_url, bucket);
        let response = self
            .http
            .delete(url)
            .json(&json!({ "prefixes": paths }))
            .send()
            .await
            .map_err(BlobError::backend)?;
        let response = Self::check(response, bucket).await?;

        let removed: Vec<ListedObject> = response.json().await.map_err(BlobError::backend)?;
        Ok(removed.into_iter().map(|o| o.name).collect())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url,
            bucket,
            path.trim_start_matches('/')
        )
    }
}
