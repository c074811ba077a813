//! Typed HTTP client for the per-node bundle API, used by the coordinator and by the cluster
//! handler's fan-out path. Grounded on `original_source/api/rest/client/client.go` and
//! `client_errors.go`.

use std::path::Path;
use std::time::Duration;

use reqwest::StatusCode;
use tokio::io::AsyncWriteExt;

use crate::error::{BundleError, Result};
use crate::model::{Bundle, CreateBundleRequest};

pub const BUNDLES_ENDPOINT: &str = "/system/health/v1/node/diagnostics";

#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: String,
}

impl Client {
    pub fn new(node_addr: &str, timeout: Duration) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: node_addr.trim_end_matches('/').to_string(),
        })
    }

    fn bundle_url(&self, id: &str) -> String {
        format!("{}{}/{}", self.base_url, BUNDLES_ENDPOINT, id)
    }

    fn collection_url(&self) -> String {
        format!("{}{}", self.base_url, BUNDLES_ENDPOINT)
    }

    pub async fn create_bundle(&self, id: &str) -> Result<Bundle> {
        let response = self
            .http
            .put(self.bundle_url(id))
            .json(&CreateBundleRequest::default())
            .send()
            .await
            .map_err(transport_error)?;
        decode(response, id).await
    }

    pub async fn status(&self, id: &str) -> Result<Bundle> {
        let response = self
            .http
            .get(self.bundle_url(id))
            .send()
            .await
            .map_err(transport_error)?;
        decode(response, id).await
    }

    pub async fn list(&self) -> Result<Vec<Bundle>> {
        let response = self
            .http
            .get(self.collection_url())
            .send()
            .await
            .map_err(transport_error)?;
        decode(response, "").await
    }

    pub async fn delete(&self, id: &str) -> Result<Bundle> {
        let response = self
            .http
            .delete(self.bundle_url(id))
            .send()
            .await
            .map_err(transport_error)?;
        decode(response, id).await
    }

    /// Streams the remote archive to `dest`, creating/truncating it.
    pub async fn get_file(&self, id: &str, dest: &Path) -> Result<()> {
        let response = self
            .http
            .get(format!("{}/file", self.bundle_url(id)))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(BundleError::from_status(id, status, &body)
                .unwrap_or(BundleError::Unreadable(anyhow::anyhow!("{body}"))));
        }

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| BundleError::InsufficientStorage(id.to_string(), e.into()))?;
        let bytes = response.bytes().await.map_err(transport_error)?;
        file.write_all(&bytes)
            .await
            .map_err(|e| BundleError::InsufficientStorage(id.to_string(), e.into()))?;
        Ok(())
    }
}

async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response, id: &str) -> Result<T> {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    if let Some(err) = BundleError::from_status(id, status, &body) {
        return Err(err);
    }

    serde_json::from_str(&body).map_err(|e| BundleError::Unreadable(e.into()))
}

fn transport_error(e: reqwest::Error) -> BundleError {
    BundleError::Transport {
        status: e.status().map(|s| s.as_u16()).unwrap_or(0),
        excerpt: e.to_string(),
    }
}
