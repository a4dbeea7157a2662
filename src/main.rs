//! DMD render graph runner

use std::path::PathBuf;

use color_eyre::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use dmdgraph::pipeline::{self, ConfiguredGraph};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dmdgraph=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    info!("dmdgraph launching...");

    let path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = pipeline::load_config(path.as_deref())?;
    info!("Rendering {}x{} frames", config.graph.width, config.graph.height);

    let ConfiguredGraph { mut graph, views } = pipeline::from_config(&config)?;
    graph.start()?;
    info!("{} running with {} virtual display(s), Ctrl-C to stop", graph.name(), views.len());

    tokio::signal::ctrl_c().await?;

    info!("Shutting down...");
    graph.dispose()?;
    let stats = graph.stats();
    info!(
        "Received {} frames, dispatched {}, dropped {}, skipped {}, {} destination error(s)",
        stats.frames_received,
        stats.frames_dispatched,
        stats.frames_dropped,
        stats.frames_skipped,
        stats.destination_errors
    );

    Ok(())
}
