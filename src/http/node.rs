//! Node-level HTTP handlers: the per-node bundle API surface described in spec §6, backed
//! directly by [`crate::store::Store`]. Grounded on
//! `original_source/api/rest/bundle_handler.go` for the operation set and status codes.

use std::sync::Arc;

use axum::body::StreamBody;
use axum::extract::{Extension, Path};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tokio_util::io::ReaderStream;

use crate::error::Result;
use crate::model::Bundle;
use crate::store::Store;

pub type NodeState = Arc<Store>;

pub async fn create(
    Extension(store): Extension<NodeState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<Bundle>)> {
    let bundle = store.create(&id).await?;
    Ok((StatusCode::OK, Json(bundle)))
}

pub async fn list(Extension(store): Extension<NodeState>) -> Result<Json<Vec<Bundle>>> {
    Ok(Json(store.list().await?))
}

pub async fn status(
    Extension(store): Extension<NodeState>,
    Path(id): Path<String>,
) -> Result<Json<Bundle>> {
    Ok(Json(store.get(&id).await?))
}

pub async fn download(
    Extension(store): Extension<NodeState>,
    Path(id): Path<String>,
) -> Result<Response> {
    let path = store.get_file(&id).await?;
    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|e| crate::error::BundleError::Unreadable(e.into()))?;
    let len = file
        .metadata()
        .await
        .map_err(|e| crate::error::BundleError::Unreadable(e.into()))?
        .len();

    let body = StreamBody::new(ReaderStream::new(file));
    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (header::CONTENT_LENGTH, len.to_string()),
        ],
        body,
    )
        .into_response())
}

/// Deleting an already-tombstoned bundle is not an error: it returns 304 with the tombstone
/// descriptor, matching spec §8's "DELETE on an id in Deleted returns 304 with the tombstone
/// body" boundary behavior.
pub async fn delete(
    Extension(store): Extension<NodeState>,
    Path(id): Path<String>,
) -> Result<Response> {
    match store.delete(&id).await {
        Ok(bundle) => Ok((StatusCode::OK, Json(bundle)).into_response()),
        Err(crate::error::BundleError::NotCompleted(_)) => {
            let bundle = store.get(&id).await?;
            Ok((StatusCode::NOT_MODIFIED, Json(bundle)).into_response())
        }
        Err(e) => Err(e),
    }
}
