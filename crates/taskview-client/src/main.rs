//! taskview-follow: follow a running taskview server from the terminal.
//!
//! Opens the event stream, reconciles every change into a session, and logs
//! the resulting view.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use taskview_client::{HttpSource, LogRenderer, SessionDriver, follow};
use taskview_core::{ClientSession, ClientViewState, TaskFilter};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "taskview-follow")]
#[command(about = "Follow a taskview server and log live task updates")]
struct Args {
    /// Base URL of the server
    #[arg(long, default_value = "http://localhost:3737", env = "TASKVIEW_URL")]
    url: String,

    /// Delay before reconnecting a dropped event stream, in milliseconds
    #[arg(long, default_value_t = 3000)]
    reconnect_ms: u64,

    /// Tag to show instead of the project's current tag
    #[arg(long)]
    tag: Option<String>,

    /// Only show tasks with this status (repeatable)
    #[arg(long)]
    status: Vec<String>,

    /// Only show tasks matching this text
    #[arg(long, default_value = "")]
    search: String,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Respects RUST_LOG, defaults to info (or debug with --verbose)
    let default_filter = if args.verbose {
        "debug,taskview_client=debug,taskview_core=debug"
    } else {
        "info,taskview_client=info,taskview_core=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let source = HttpSource::new(&args.url).context("Invalid --url")?;
    let events_url = source.url("/api/events");
    let client = source.client().clone();
    info!("Following {}", source.base_url());

    let state = ClientViewState {
        current_tag: args.tag,
        filters: TaskFilter {
            status: args.status.into_iter().collect(),
            search: args.search,
            ..Default::default()
        },
        ..Default::default()
    };
    let driver = SessionDriver::new(ClientSession::new(state), source, LogRenderer::new());

    let (frames, stream_task) = follow(
        client,
        events_url,
        Duration::from_millis(args.reconnect_ms),
    );

    tokio::select! {
        driver = driver.run(frames) => {
            if !driver.is_loaded() {
                warn!("Project was never loaded");
            }
        }
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl+C")?;
            info!("Shutdown signal received");
        }
    }

    stream_task.abort();
    Ok(())
}
