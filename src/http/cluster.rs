//! Cluster-level HTTP handlers. Owns the cluster's own local bundle directory (the aggregate
//! lives there once finalized) and, for ids it doesn't own, fans out to every master node and
//! merges the answers. Merge precedence rules are grounded on
//! `original_source/api/rest/cluster_bundle_handler_test.go`, the only surviving behavioral
//! source for the Go `ClusterBundleHandler`.

use std::sync::Arc;
use std::time::Duration;

use axum::body::StreamBody;
use axum::extract::{Extension, Path};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;

use crate::client::Client;
use crate::coordinator::Coordinator;
use crate::error::{BundleError, Result};
use crate::model::Bundle;
use crate::node_source::NodeSource;
use crate::store::Store;

pub struct ClusterState {
    pub store: Store,
    pub coordinator: Coordinator,
    pub nodes: Arc<dyn NodeSource>,
    pub node_port: u16,
    pub request_timeout: Duration,
}

pub type Shared = Arc<ClusterState>;

/// Allocates the local bundle directory, then spawns the fan-out/fan-in pipeline in the
/// background and returns immediately with the freshly created `Started` descriptor. Clients
/// are expected to poll `GET` for completion.
pub async fn create(
    Extension(state): Extension<Shared>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<Bundle>)> {
    let bundle = state.store.create(&id).await?;

    let masters = state.nodes.master_nodes();
    let agents = state.nodes.agent_nodes();
    let mut nodes = masters;
    nodes.extend(agents);
    let num_nodes = nodes.len();

    let state_bg = Arc::clone(&state);
    let id_bg = id.clone();
    tokio::spawn(async move {
        let cancel = CancellationToken::new();
        let statuses = state_bg.coordinator.create_bundle(id_bg.clone(), nodes, cancel);
        match state_bg
            .coordinator
            .collect_bundle(&id_bg, num_nodes, statuses)
            .await
        {
            Ok((archive_path, errors)) => {
                let dest = state_bg.store.data_path(&id_bg);
                if let Err(e) = tokio::fs::rename(&archive_path, &dest).await {
                    tracing::error!(id = %id_bg, error = %e, "failed to move aggregate archive into place");
                }
                if let Err(e) = state_bg.store.finish(&id_bg, errors).await {
                    tracing::error!(id = %id_bg, error = ?e, "failed to finalize cluster bundle");
                }
            }
            Err(e) => {
                tracing::error!(id = %id_bg, error = ?e, "failed to collect cluster bundle");
                let _ = state_bg.store.cancel(&id_bg).await;
            }
        }
    });

    Ok((StatusCode::OK, Json(bundle)))
}

pub async fn status(
    Extension(state): Extension<Shared>,
    Path(id): Path<String>,
) -> Result<Json<Bundle>> {
    if let Ok(bundle) = state.store.get(&id).await {
        return Ok(Json(bundle));
    }

    let masters = state.nodes.master_nodes();
    let mut saw_unreadable = false;

    for master in masters {
        let client = client_for(&state, &master)?;
        match client.status(&id).await {
            Ok(bundle) => return Ok(Json(bundle)),
            Err(BundleError::NotFound(_)) => {}
            Err(BundleError::Unreadable(_)) => saw_unreadable = true,
            Err(_) => {}
        }
    }

    if saw_unreadable {
        Err(BundleError::Unreadable(anyhow::anyhow!(
            "bundle {id} unreadable on at least one master"
        )))
    } else {
        Err(BundleError::NotFound(id))
    }
}

pub async fn list(Extension(state): Extension<Shared>) -> Result<Json<Vec<Bundle>>> {
    let mut seen = std::collections::HashSet::new();
    let mut bundles = state.store.list().await?;
    for bundle in &bundles {
        seen.insert(bundle.id.clone());
    }

    for master in state.nodes.master_nodes() {
        let Ok(client) = client_for(&state, &master) else {
            continue;
        };
        if let Ok(remote) = client.list().await {
            for bundle in remote {
                if seen.insert(bundle.id.clone()) {
                    bundles.push(bundle);
                }
            }
        }
    }

    Ok(Json(bundles))
}

pub async fn download(
    Extension(state): Extension<Shared>,
    Path(id): Path<String>,
) -> Result<Response> {
    if let Ok(path) = state.store.get_file(&id).await {
        return stream_file(&path).await;
    }

    let masters = state.nodes.master_nodes();
    let mut saw_unreadable = false;

    for master in masters {
        let client = client_for(&state, &master)?;
        match client.status(&id).await {
            Ok(_) => {
                let scratch = std::env::temp_dir().join(format!("{id}-{}.zip", uuid::Uuid::new_v4()));
                client.get_file(&id, &scratch).await?;
                let response = stream_file(&scratch).await;
                let _ = tokio::fs::remove_file(&scratch).await;
                return response;
            }
            Err(BundleError::NotFound(_)) => {}
            Err(BundleError::Unreadable(_)) => saw_unreadable = true,
            Err(_) => {}
        }
    }

    if saw_unreadable {
        Err(BundleError::Unreadable(anyhow::anyhow!(
            "bundle {id} unreadable on at least one master"
        )))
    } else {
        Err(BundleError::NotFound(id))
    }
}

/// Deletes on every master; succeeds if at least one did. Otherwise, precedence follows
/// `original_source/api/rest/cluster_bundle_handler_test.go`'s `TestDeleteAlreadyDeletedBundle`:
/// any hard error (unreadable/transport) outranks a tombstone, which outranks not-found — so a
/// mixed `NotFound`+`NotCompleted` response set (no success, no hard error) still returns 304.
pub async fn delete(
    Extension(state): Extension<Shared>,
    Path(id): Path<String>,
) -> Result<Response> {
    if let Ok(bundle) = state.store.delete(&id).await {
        return Ok((StatusCode::OK, Json(bundle)).into_response());
    }

    let masters = state.nodes.master_nodes();
    if masters.is_empty() {
        return Err(BundleError::NotFound(id));
    }

    let mut any_success = None;
    let mut saw_not_completed = false;
    let mut saw_hard_error = false;

    for master in &masters {
        let client = client_for(&state, master)?;
        match client.delete(&id).await {
            Ok(bundle) => any_success = Some(bundle),
            Err(BundleError::NotCompleted(_)) => saw_not_completed = true,
            Err(BundleError::NotFound(_)) => {}
            Err(_) => saw_hard_error = true,
        }
    }

    if let Some(bundle) = any_success {
        Ok((StatusCode::OK, Json(bundle)).into_response())
    } else if saw_hard_error {
        Err(BundleError::Unreadable(anyhow::anyhow!(
            "delete of bundle {id} failed on at least one master"
        )))
    } else if saw_not_completed {
        let bundle = state.store.get(&id).await.ok();
        Ok((StatusCode::NOT_MODIFIED, Json(bundle)).into_response())
    } else {
        Err(BundleError::NotFound(id))
    }
}

fn client_for(state: &ClusterState, node: &crate::model::Node) -> Result<Client> {
    Client::new(&format!("http://{}:{}", node.ip, state.node_port), state.request_timeout)
        .map_err(|e| BundleError::Transport {
            status: 0,
            excerpt: e.to_string(),
        })
}

async fn stream_file(path: &std::path::Path) -> Result<Response> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| BundleError::Unreadable(e.into()))?;
    let len = file
        .metadata()
        .await
        .map_err(|e| BundleError::Unreadable(e.into()))?
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
