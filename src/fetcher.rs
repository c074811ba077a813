//! Streams a bounded set of HTTP endpoint responses into one archive per node, publishing a
//! status update per request. Grounded on `original_source/fetcher/fetcher.go`.

use std::path::{Path, PathBuf};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::archive;
use crate::model::{EndpointFetchRequest, FetchStatusUpdate};

/// Emitted exactly once, when the fetcher's loop terminates (request channel closed, or
/// cancellation), carrying the path to whatever was written so far.
#[derive(Debug, Clone)]
pub struct FetchBulkResponse {
    pub zip_file_path: PathBuf,
}

pub struct Fetcher {
    archive_path: PathBuf,
    client: reqwest::Client,
}

impl Fetcher {
    /// Creates the archive file up front, so allocation failures surface before any fetch is
    /// attempted.
    pub async fn new(scratch_dir: &Path, client: reqwest::Client) -> std::io::Result<Self> {
        tokio::fs::create_dir_all(scratch_dir).await?;
        let archive_path = scratch_dir.join(format!("{}.zip", uuid::Uuid::new_v4()));
        let writer = archive::create(&archive_path)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        archive::finish(writer).map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        Ok(Self {
            archive_path,
            client,
        })
    }

    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }

    /// Consumes `requests` until the channel closes or `cancel` fires, whichever comes first.
    /// Cancellation wins even mid-request: a fetch already in flight is allowed to finish, but
    /// its status update is dropped if cancellation happened in the meantime, and no further
    /// requests are pulled off the channel.
    pub async fn run(
        self,
        mut requests: mpsc::Receiver<EndpointFetchRequest>,
        status_tx: mpsc::Sender<FetchStatusUpdate>,
        cancel: CancellationToken,
    ) -> FetchBulkResponse {
        let mut writer = match archive::create(&self.archive_path) {
            Ok(w) => w,
            Err(e) => {
                tracing::error!(error = %e, "failed to reopen fetcher archive");
                return FetchBulkResponse {
                    zip_file_path: self.archive_path,
                };
            }
        };

        loop {
            let request = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                request = requests.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
            };

            let outcome = self.fetch_one(&request).await;
            let update = match outcome {
                Ok(entry) => {
                    if let Err(e) = archive::write_entry(&mut writer, &entry.name, &entry.bytes) {
                        tracing::warn!(url = %request.url, error = %e, "failed to write archive entry");
                        FetchStatusUpdate {
                            url: request.url.clone(),
                            error: Some(e.to_string()),
                        }
                    } else {
                        FetchStatusUpdate {
                            url: request.url.clone(),
                            error: None,
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(url = %request.url, error = %e, "endpoint fetch failed");
                    FetchStatusUpdate {
                        url: request.url.clone(),
                        error: Some(e.to_string()),
                    }
                }
            };

            if cancel.is_cancelled() {
                break;
            }
            let _ = status_tx.send(update).await;
        }

        if let Err(e) = archive::finish(writer) {
            tracing::error!(error = %e, "failed to finalize fetcher archive");
        }

        FetchBulkResponse {
            zip_file_path: self.archive_path,
        }
    }

    async fn fetch_one(&self, request: &EndpointFetchRequest) -> anyhow::Result<ArchiveEntry> {
        let response = self
            .client
            .get(&request.url)
            .header(reqwest::header::ACCEPT_ENCODING, "gzip")
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("unexpected status {status} for {}: {body}", request.url);
        }

        let is_gzip = response
            .headers()
            .get(reqwest::header::CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.eq_ignore_ascii_case("gzip"))
            .unwrap_or(false);

        let bytes = response.bytes().await?.to_vec();

        let mut filename = request.filename.clone();
        if is_gzip && !filename.ends_with(".gz") {
            filename.push_str(".gz");
        }

        let name = format!(
            "{}_{}/{}",
            request.node.ip, request.node.role, filename
        );
        Ok(ArchiveEntry { name, bytes })
    }
}

struct ArchiveEntry {
    name: String,
    bytes: Vec<u8>,
}
