//! Runs a change stream spec file against the in-memory store.
//!
//! ```sh
//! RUST_LOG=watchspec=info cargo run --example memory-suite [path/to/spec.json]
//! ```
//!
//! Without a path the bundled fixture is used. The file runs once against a
//! replica set and once against a single server, so topology-gated cases are
//! exercised on both sides.

use std::{process::ExitCode, time::Duration};

use tracing_subscriber::EnvFilter;
use watchspec::{Config, SpecFile, SpecRunner, Topology, memory::MemoryServer};

const BUNDLED: &str = include_str!("../fixtures/change-streams.json");

#[tokio::main]
async fn main() -> watchspec::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("watchspec=info")),
        )
        .init();

    let file = match std::env::args().nth(1) {
        Some(path) => SpecFile::from_path(path)?,
        None => BUNDLED.parse()?,
    };

    // Nothing to wait for in memory; keep the settle delay short.
    let config = Config::default().with_settle_delay(Duration::from_millis(20));
    let mut all_passed = true;

    for topology in [Topology::ReplicaSet, Topology::Single] {
        let server = MemoryServer::new().with_topology(topology);
        let report = SpecRunner::new(server.connector())
            .with_config(config.clone())
            .run_file(&file)
            .await?;

        println!("{topology}: {report}");
        for (description, error) in report.failures() {
            println!("  FAILED {description}: {error}");
        }
        all_passed &= report.is_success();
    }

    Ok(if all_passed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
