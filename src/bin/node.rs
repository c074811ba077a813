//! Node binary: serves one node's local bundle store over HTTP.

use std::sync::Arc;

use argh::FromArgs;
use diag_bundle::config::{Config, Role};
use diag_bundle::http;
use diag_bundle::store::Store;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// run the diagnostics bundle node server
#[derive(FromArgs)]
struct Args {}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _args: Args = argh::from_env();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env(Role::Node)?;
    let store = Arc::new(Store::new(&config.work_dir));

    let addr = config.bind_addr.parse()?;
    let app = http::node_router(store);

    tracing::info!(%config.bind_addr, "starting node server");
    axum::Server::bind(&addr).serve(app.into_make_service()).await?;

    Ok(())
}
