use std::time::Duration;

use async_trait::async_trait;
use proctorcam_types::{snapshot::SnapshotKey, Result};
use reqwest::{header::CONTENT_TYPE, Client};
use tracing::debug;

use crate::{upload_error, ObjectStore, StoredObject};

/// Uploads objects with `PUT {endpoint}/{bucket}/{key}` and a bearer token.
#[derive(Debug, Clone)]
pub struct HttpObjectStore {
    client: Client,
    endpoint: String,
    bucket: String,
}

impl HttpObjectStore {
    pub fn new(endpoint: &str, bucket: &str, timeout_ms: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|err| upload_error(format!("failed to build http client: {err}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
        })
    }

    pub fn object_url(&self, key: &SnapshotKey) -> String {
        format!("{}/{}/{}", self.endpoint, self.bucket, key.as_path())
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn put_object(
        &self,
        key: &SnapshotKey,
        content_type: &str,
        body: Vec<u8>,
        token: &str,
    ) -> Result<StoredObject> {
        let url = self.object_url(key);
        let size = body.len();
        let response = self
            .client
            .put(&url)
            .header(CONTENT_TYPE, content_type)
            .bearer_auth(token)
            .body(body)
            .send()
            .await
            .map_err(|err| upload_error(format!("PUT {url}: {err}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(upload_error(format!("PUT {url} returned {status}: {text}")));
        }

        debug!("Uploaded {} bytes to {}", size, url);
        Ok(StoredObject {
            key: key.as_path(),
            size,
        })
    }
}
