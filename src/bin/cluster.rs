//! Cluster binary: orchestrates remote nodes via the node binary's HTTP API and serves the
//! cluster-level bundle surface.

use std::sync::Arc;

use argh::FromArgs;
use diag_bundle::config::{Config, Role};
use diag_bundle::coordinator::Coordinator;
use diag_bundle::http::{self, cluster::ClusterState};
use diag_bundle::node_source::StaticNodeSource;
use diag_bundle::store::Store;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// run the diagnostics bundle cluster coordinator
#[derive(FromArgs)]
struct Args {
    /// port the per-node server listens on
    #[argh(option, default = "8080")]
    node_port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Args = argh::from_env();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env(Role::Cluster)?;
    let nodes_file = config
        .nodes_file
        .as_ref()
        .expect("Config::from_env(Role::Cluster) guarantees nodes_file is set");
    let nodes = Arc::new(StaticNodeSource::from_file(nodes_file).await?);

    let scratch_dir = config.work_dir.join(".scratch");
    let coordinator = Coordinator::new(
        args.node_port,
        config.request_timeout,
        config.poll_interval,
        &scratch_dir,
    );

    let state = http::shared(ClusterState {
        store: Store::new(&config.work_dir),
        coordinator,
        nodes,
        node_port: args.node_port,
        request_timeout: config.request_timeout,
    });

    let addr = config.bind_addr.parse()?;
    let app = http::cluster_router(state);

    tracing::info!(%config.bind_addr, "starting cluster server");
    axum::Server::bind(&addr).serve(app.into_make_service()).await?;

    Ok(())
}
