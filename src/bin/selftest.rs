//! Self-test binary: runs the fixed check registry and prints a pass/fail report. Exits
//! non-zero if any check failed.

use diag_bundle::config::{Config, Role};
use diag_bundle::node_source::StaticNodeSource;
use diag_bundle::selftest;
use diag_bundle::store::Store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env(Role::Node)?;
    let store = Store::new(&config.work_dir);
    let nodes = match &config.nodes_file {
        Some(path) => StaticNodeSource::from_file(path).await?,
        None => StaticNodeSource::from_nodes(vec![]),
    };

    let results = selftest::run(&store, &nodes).await;

    let mut any_failed = false;
    for (name, outcome) in &results {
        if outcome.success {
            println!("PASS  {name}");
        } else {
            any_failed = true;
            println!(
                "FAIL  {name}: {}",
                outcome.error_message.as_deref().unwrap_or("unknown error")
            );
        }
    }

    if any_failed {
        std::process::exit(1);
    }
    Ok(())
}
