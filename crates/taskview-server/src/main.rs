//! taskview: serve a Task Master project's tasks and documents with live reload.

use anyhow::Result;
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use taskview_server::{Server, ServerArgs, ServerConfig};

#[tokio::main]
async fn main() {
    let args = ServerArgs::parse();

    // Respects RUST_LOG, defaults to info (or debug with --verbose)
    let default_filter = if args.verbose {
        "debug,taskview_server=debug,tower_http=debug"
    } else {
        "info,taskview_server=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = run(args).await {
        error!("Failed to start server: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: ServerArgs) -> Result<()> {
    let config = ServerConfig::from_args(args)?;
    info!("Project: {}", config.project_dir.display());

    let requested_port = config.port;
    let server = Server::bind(config).await?;
    let addr = server.local_addr();

    info!("Task Master viewer running at http://localhost:{}", addr.port());
    if addr.port() != requested_port {
        info!("(Port {} was busy, using {})", requested_port, addr.port());
    }
    info!("Press Ctrl+C to stop");

    server.serve(shutdown_signal()).await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
