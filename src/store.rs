//! The per-node bundle store: `workDir/<id>/{state.json,file.zip}`, with self-healing size
//! reconciliation and sticky Canceled/Deleted tombstones.
//!
//! Grounded on `original_source/api/bundle_handler.go`: Create/Get/GetFile/List/Delete on a
//! single `workDir`, directories at 0700 and files at 0600.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::fs;

use crate::error::{BundleError, Result};
use crate::model::{Bundle, Status};

const DIR_MODE: u32 = 0o700;
const FILE_MODE: u32 = 0o600;
const STATE_FILE: &str = "state.json";
const DATA_FILE: &str = "file.zip";

#[derive(Debug, Clone)]
pub struct Store {
    work_dir: PathBuf,
}

impl Store {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    fn bundle_dir(&self, id: &str) -> PathBuf {
        self.work_dir.join(id)
    }

    fn state_path(&self, id: &str) -> PathBuf {
        self.bundle_dir(id).join(STATE_FILE)
    }

    pub fn data_path(&self, id: &str) -> PathBuf {
        self.bundle_dir(id).join(DATA_FILE)
    }

    pub async fn create(&self, id: &str) -> Result<Bundle> {
        let dir = self.bundle_dir(id);
        if fs::metadata(&dir).await.is_ok() {
            return Err(BundleError::AlreadyExists(id.to_string()));
        }

        fs::create_dir_all(&dir)
            .await
            .map_err(|e| insufficient_storage(id, e))?;
        set_mode(&dir, DIR_MODE)
            .await
            .map_err(|e| insufficient_storage(id, e))?;

        let bundle = Bundle::started(id, Utc::now());
        self.write_state(id, &bundle)
            .await
            .map_err(|e| insufficient_storage(id, e))?;

        fs::write(self.data_path(id), []).await.map_err(|e| insufficient_storage(id, e))?;
        set_mode(&self.data_path(id), FILE_MODE)
            .await
            .map_err(|e| insufficient_storage(id, e))?;

        Ok(bundle)
    }

    /// Reads the descriptor, self-healing the recorded size against the archive's actual size
    /// for any non-tombstone bundle. This is how completion written by an out-of-band
    /// finalization task (the coordinator or fetcher) becomes visible to readers.
    pub async fn get(&self, id: &str) -> Result<Bundle> {
        let mut bundle = self.read_state(id).await?;

        if !bundle.status.is_tombstone() && bundle.status != Status::Unknown {
            match fs::metadata(self.data_path(id)).await {
                Ok(meta) => {
                    let actual = meta.len();
                    if actual != bundle.size {
                        bundle.size = actual;
                        self.write_state(id, &bundle)
                            .await
                            .map_err(|e| insufficient_storage(id, e))?;
                    }
                }
                Err(e) => return Err(BundleError::Unreadable(e.into())),
            }
        }

        Ok(bundle)
    }

    pub async fn get_file(&self, id: &str) -> Result<PathBuf> {
        let path = self.data_path(id);
        fs::metadata(&path)
            .await
            .map_err(|_| BundleError::NotFound(id.to_string()))?;
        Ok(path)
    }

    /// Lists every bundle directory under `workDir`. Entries whose descriptor cannot be read are
    /// reported as `Unknown` rather than dropped, matching the observable behavior of the
    /// original implementation.
    pub async fn list(&self) -> Result<Vec<Bundle>> {
        let mut bundles = Vec::new();
        let mut entries = match fs::read_dir(&self.work_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(bundles),
            Err(e) => return Err(BundleError::Unreadable(e.into())),
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| BundleError::Unreadable(e.into()))?
        {
            if !entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }
            let id = entry.file_name().to_string_lossy().into_owned();
            match self.get(&id).await {
                Ok(bundle) => bundles.push(bundle),
                Err(_) => bundles.push(Bundle {
                    id,
                    size: 0,
                    status: Status::Unknown,
                    started_at: Utc::now(),
                    stopped_at: None,
                    errors: Vec::new(),
                }),
            }
        }

        Ok(bundles)
    }

    /// Removes the archive and marks the bundle Deleted. Already-tombstoned bundles return
    /// `NotCompleted` (mapped to HTTP 304) with the descriptor unchanged.
    pub async fn delete(&self, id: &str) -> Result<Bundle> {
        let mut bundle = self.read_state(id).await?;

        if bundle.status.is_tombstone() {
            return Err(BundleError::NotCompleted(id.to_string()));
        }

        if let Err(e) = fs::remove_file(self.data_path(id)).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(BundleError::Unreadable(e.into()));
            }
        }

        bundle.size = 0;
        bundle.status = Status::Deleted;
        bundle.stopped_at = Some(Utc::now());
        self.write_state(id, &bundle)
            .await
            .map_err(|e| insufficient_storage(id, e))?;

        Ok(bundle)
    }

    /// Finalizes a bundle whose archive has already been written to `data_path(id)` by an
    /// out-of-band task (the fetcher or the coordinator), setting it Done.
    pub async fn finish(&self, id: &str, errors: Vec<String>) -> Result<Bundle> {
        let mut bundle = self.read_state(id).await?;
        let size = fs::metadata(self.data_path(id))
            .await
            .map(|m| m.len())
            .unwrap_or(0);

        bundle.status = Status::Done;
        bundle.size = size;
        bundle.stopped_at = Some(Utc::now());
        bundle.errors = errors;
        self.write_state(id, &bundle)
            .await
            .map_err(|e| insufficient_storage(id, e))?;
        Ok(bundle)
    }

    /// Marks a bundle Canceled in place of Done, for a create task whose context was cancelled
    /// before the archive could be finalized. See DESIGN.md's open-question decision.
    pub async fn cancel(&self, id: &str) -> Result<Bundle> {
        let mut bundle = self.read_state(id).await?;
        bundle.status = Status::Canceled;
        bundle.size = 0;
        bundle.stopped_at = Some(Utc::now());
        let _ = fs::remove_file(self.data_path(id)).await;
        self.write_state(id, &bundle)
            .await
            .map_err(|e| insufficient_storage(id, e))?;
        Ok(bundle)
    }

    async fn read_state(&self, id: &str) -> Result<Bundle> {
        let raw = fs::read(self.state_path(id))
            .await
            .map_err(|_| BundleError::NotFound(id.to_string()))?;
        serde_json::from_slice(&raw).map_err(|e| BundleError::Unreadable(e.into()))
    }

    async fn write_state(&self, id: &str, bundle: &Bundle) -> anyhow::Result<()> {
        let raw = serde_json::to_vec_pretty(bundle)?;
        fs::write(self.state_path(id), raw).await?;
        set_mode(&self.state_path(id), FILE_MODE).await?;
        Ok(())
    }
}

fn insufficient_storage(id: &str, e: impl Into<anyhow::Error>) -> BundleError {
    BundleError::InsufficientStorage(id.to_string(), e.into())
}

async fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        (dir, store)
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let (_dir, store) = store();
        let created = store.create("bundle-0").await.unwrap();
        assert_eq!(created.status, Status::Started);

        let fetched = store.get("bundle-0").await.unwrap();
        assert_eq!(fetched.id, "bundle-0");
        assert_eq!(fetched.size, 0);
    }

    #[tokio::test]
    async fn create_twice_conflicts() {
        let (_dir, store) = store();
        store.create("bundle-0").await.unwrap();
        let err = store.create("bundle-0").await.unwrap_err();
        assert!(matches!(err, BundleError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn get_self_heals_size_after_external_write() {
        let (_dir, store) = store();
        store.create("bundle-0").await.unwrap();
        fs::write(store.data_path("bundle-0"), b"some diagnostics")
            .await
            .unwrap();

        let bundle = store.get("bundle-0").await.unwrap();
        assert_eq!(bundle.size, "some diagnostics".len() as u64);
    }

    #[tokio::test]
    async fn finish_marks_done_with_observed_size() {
        let (_dir, store) = store();
        store.create("bundle-0").await.unwrap();
        fs::write(store.data_path("bundle-0"), b"archive bytes")
            .await
            .unwrap();

        let done = store.finish("bundle-0", vec![]).await.unwrap();
        assert_eq!(done.status, Status::Done);
        assert_eq!(done.size, "archive bytes".len() as u64);
        assert!(done.stopped_at.is_some());
    }

    #[tokio::test]
    async fn delete_is_sticky() {
        let (_dir, store) = store();
        store.create("bundle-0").await.unwrap();
        let deleted = store.delete("bundle-0").await.unwrap();
        assert_eq!(deleted.status, Status::Deleted);
        assert_eq!(deleted.size, 0);

        let err = store.delete("bundle-0").await.unwrap_err();
        assert!(matches!(err, BundleError::NotCompleted(_)));
    }

    #[tokio::test]
    async fn get_missing_id_is_not_found() {
        let (_dir, store) = store();
        let err = store.get("missing").await.unwrap_err();
        assert!(matches!(err, BundleError::NotFound(_)));
    }

    #[tokio::test]
    async fn list_reports_unreadable_dirs_as_unknown() {
        let (dir, store) = store();
        store.create("bundle-0").await.unwrap();
        tokio::fs::create_dir(dir.path().join("corrupt")).await.unwrap();

        let mut bundles = store.list().await.unwrap();
        bundles.sort_by(|a, b| a.id.cmp(&b.id));
        assert_eq!(bundles.len(), 2);
        assert_eq!(bundles[0].id, "bundle-0");
        assert_eq!(bundles[1].id, "corrupt");
        assert_eq!(bundles[1].status, Status::Unknown);
    }

    #[tokio::test]
    async fn list_on_empty_work_dir_is_empty_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("does-not-exist-yet"));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn created_paths_use_restrictive_permissions() {
        let (dir, store) = store();
        store.create("bundle-0").await.unwrap();

        let dir_mode = fs::metadata(dir.path().join("bundle-0"))
            .await
            .unwrap()
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(dir_mode, DIR_MODE);

        let file_mode = fs::metadata(store.data_path("bundle-0"))
            .await
            .unwrap()
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(file_mode, FILE_MODE);
    }
}
