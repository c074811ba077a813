//! End-to-end happy path across three real node servers (two agents, one leader master),
//! exercising the cluster handler's create/status/download/delete surface. Mirrors the scenario
//! and archive layout asserted by `original_source/api/rest/cluster_bundle_handler_test.go`'s
//! `TestRemoteBundleCreation` (sorted entries `192.0.2.*` become `127.0.0.*` here, since the
//! test network only has loopback addresses available).

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use diag_bundle::coordinator::Coordinator;
use diag_bundle::http::cluster::ClusterState;
use diag_bundle::http::{cluster_router, node_router};
use diag_bundle::model::{Node, NodeRole, Status};
use diag_bundle::node_source::StaticNodeSource;
use diag_bundle::store::Store;
use tower::ServiceExt;

/// Starts one node server and a background task that, as soon as a bundle is created on it,
/// writes a one-entry zip archive (as the fetcher would) and finalizes it to Done.
async fn spawn_node(ip: &str, port: u16) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::new(dir.path()));
    let app = node_router(store.clone());

    tokio::spawn({
        let store = store.clone();
        async move {
            loop {
                let bundles = store.list().await.unwrap_or_default();
                for bundle in bundles {
                    if bundle.status == Status::Started {
                        let mut writer = diag_bundle::archive::create(&store.data_path(&bundle.id)).unwrap();
                        diag_bundle::archive::write_entry(&mut writer, "test.txt", b"node payload").unwrap();
                        diag_bundle::archive::finish(writer).unwrap();
                        let _ = store.finish(&bundle.id, vec![]).await;
                    }
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }
    });

    let addr = SocketAddr::new(ip.parse::<IpAddr>().unwrap(), port);
    tokio::spawn(async move {
        axum::Server::bind(&addr)
            .serve(app.into_make_service())
            .await
            .unwrap();
    });

    dir
}

fn request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn remote_bundle_creation_merges_every_node_archive() {
    let port = 18080;
    let _agent1 = spawn_node("127.0.0.1", port).await;
    let _master = spawn_node("127.0.0.2", port).await;
    let _agent2 = spawn_node("127.0.0.3", port).await;

    // give the listeners a moment to come up
    tokio::time::sleep(Duration::from_millis(50)).await;

    let nodes = StaticNodeSource::from_nodes(vec![
        Node {
            role: NodeRole::Agent,
            ip: "127.0.0.1".parse().unwrap(),
            leader: false,
        },
        Node {
            role: NodeRole::Master,
            ip: "127.0.0.2".parse().unwrap(),
            leader: true,
        },
        Node {
            role: NodeRole::Agent,
            ip: "127.0.0.3".parse().unwrap(),
            leader: false,
        },
    ]);

    let cluster_dir = tempfile::tempdir().unwrap();
    let scratch_dir = cluster_dir.path().join(".scratch");
    let state = Arc::new(ClusterState {
        store: Store::new(cluster_dir.path()),
        coordinator: Coordinator::new(
            port,
            Duration::from_secs(5),
            Duration::from_millis(10),
            &scratch_dir,
        ),
        nodes: Arc::new(nodes),
        node_port: port,
        request_timeout: Duration::from_secs(5),
    });

    let app = cluster_router(state);

    let response = app
        .clone()
        .oneshot(request(
            Method::PUT,
            "/system/health/v1/node/diagnostics/bundle-0",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mut done = false;
    for _ in 0..200 {
        let response = app
            .clone()
            .oneshot(request(
                Method::GET,
                "/system/health/v1/node/diagnostics/bundle-0",
            ))
            .await
            .unwrap();
        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
        let bundle: diag_bundle::model::Bundle = serde_json::from_slice(&body).unwrap();
        if bundle.status == Status::Done {
            done = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(done, "cluster bundle did not reach Done in time");

    let response = app
        .clone()
        .oneshot(request(
            Method::GET,
            "/system/health/v1/node/diagnostics/bundle-0/file",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = hyper::body::to_bytes(response.into_body()).await.unwrap();

    let archive_file = cluster_dir.path().join("downloaded.zip");
    tokio::fs::write(&archive_file, &body).await.unwrap();
    let mut names = diag_bundle::archive::entry_names(&archive_file).unwrap();
    names.sort();
    assert_eq!(
        names,
        vec![
            "127.0.0.1/".to_string(),
            "127.0.0.1/test.txt".to_string(),
            "127.0.0.2/".to_string(),
            "127.0.0.2/test.txt".to_string(),
            "127.0.0.3/".to_string(),
            "127.0.0.3/test.txt".to_string(),
        ]
    );

    let response = app
        .oneshot(request(
            Method::DELETE,
            "/system/health/v1/node/diagnostics/bundle-0",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
