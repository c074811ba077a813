//! Router assembly: one for the node role, one for the cluster role. Both share the same
//! CORS/trace/compression layer stack, grounded on `src/http/mod.rs`'s `server()` function.

use std::sync::Arc;

use axum::routing::{get, put};
use axum::{Extension, Router};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod cluster;
pub mod node;

use crate::client::BUNDLES_ENDPOINT;
use node::NodeState;

pub fn node_router(state: NodeState) -> Router {
    Router::new()
        .route(BUNDLES_ENDPOINT, get(node::list))
        .route(
            &format!("{BUNDLES_ENDPOINT}/:id"),
            put(node::create).get(node::status).delete(node::delete),
        )
        .route(&format!("{BUNDLES_ENDPOINT}/:id/file"), get(node::download))
        .layer(
            CorsLayer::new()
                .allow_headers(Any)
                .allow_methods(Any)
                .allow_origin(Any),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(Extension(state))
}

pub fn cluster_router(state: cluster::Shared) -> Router {
    Router::new()
        .route(BUNDLES_ENDPOINT, get(cluster::list))
        .route(
            &format!("{BUNDLES_ENDPOINT}/:id"),
            put(cluster::create)
                .get(cluster::status)
                .delete(cluster::delete),
        )
        .route(
            &format!("{BUNDLES_ENDPOINT}/:id/file"),
            get(cluster::download),
        )
        .layer(
            CorsLayer::new()
                .allow_headers(Any)
                .allow_methods(Any)
                .allow_origin(Any),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(Extension(state))
}

pub fn shared<T>(value: T) -> Arc<T> {
    Arc::new(value)
}
