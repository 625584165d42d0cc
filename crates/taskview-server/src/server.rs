//! Router assembly, port probing, and the live reload pipeline.
//!
//! Pipeline: `FileWatcher` -> `Debouncer` -> `Broadcaster` -> event streams.

use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use axum::{Router, routing::get};
use taskview_core::Channel;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::api::{self, AppState};
use crate::broadcast::Broadcaster;
use crate::config::{PORT_ATTEMPTS, ServerConfig};
use crate::debounce::Debouncer;
use crate::store::ProjectStore;
use crate::watcher::{FileWatcher, Relevance, WatchTarget};

/// Build the application router.
pub fn router(state: Arc<AppState>, public_dir: Option<&Path>) -> Router {
    let api = Router::new()
        .route("/api/project", get(api::project))
        .route("/api/tasks", get(api::tasks))
        .route("/api/tasks/{tag}", get(api::tag_tasks))
        .route("/api/prds", get(api::documents))
        .route("/api/prds/{filename}", get(api::document))
        .route("/api/stats", get(api::stats))
        .route("/api/events", get(api::events));

    let app = match public_dir {
        Some(dir) => {
            // Unknown paths get index.html for client-side routing
            let assets = ServeDir::new(dir).fallback(ServeFile::new(dir.join("index.html")));
            api.fallback_service(assets)
        }
        None => api.fallback(api::not_found),
    };

    app.layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind the first free port in `port..port + attempts`.
///
/// Port 0 asks the OS for any free port.
pub async fn bind_available(bind: &str, port: u16, attempts: u16) -> Result<TcpListener> {
    if port == 0 {
        return TcpListener::bind((bind, 0))
            .await
            .with_context(|| format!("Failed to bind {}:0", bind));
    }

    let last = port.saturating_add(attempts.saturating_sub(1));
    for candidate in port..=last {
        match TcpListener::bind((bind, candidate)).await {
            Ok(listener) => {
                if candidate != port {
                    warn!("Port {} was busy, using {}", port, candidate);
                }
                return Ok(listener);
            }
            Err(e) => debug!("Port {} unavailable: {}", candidate, e),
        }
    }

    bail!("No available ports found between {} and {}", port, last)
}

/// Watch targets for a project: the tasks file and the docs directory.
pub fn watch_targets(config: &ServerConfig) -> Vec<WatchTarget> {
    vec![
        WatchTarget::new(
            config.tasks_dir(),
            Channel::Tasks,
            Relevance::File("tasks.json".to_string()),
        ),
        WatchTarget::new(config.docs_dir(), Channel::Documents, Relevance::Documents),
    ]
}

/// Background tasks moving file changes to the broadcaster.
pub struct LiveReload {
    tasks: Vec<JoinHandle<()>>,
}

impl LiveReload {
    pub fn start(config: &ServerConfig, broadcaster: Broadcaster) -> Result<Self> {
        let mut watcher =
            FileWatcher::new(watch_targets(config)).context("Failed to start file watcher")?;
        let (debouncer, mut notifications) = Debouncer::spawn(config.debounce);

        // The watcher moves into this task to stay alive for the server's lifetime
        let record = tokio::spawn(async move {
            while let Some(change) = watcher.event_rx().recv().await {
                debouncer.record(change.channel);
            }
            debug!("File watcher stopped");
        });

        let forward = tokio::spawn(async move {
            while let Some(notification) = notifications.recv().await {
                info!("{} changed, notifying clients", notification.channel.name());
                broadcaster.publish(notification);
            }
        });

        Ok(Self {
            tasks: vec![record, forward],
        })
    }

    pub fn stop(self) {
        for task in self.tasks {
            task.abort();
        }
    }
}

/// A bound but not yet running viewer.
pub struct Server {
    listener: TcpListener,
    app: Router,
    broadcaster: Broadcaster,
    live_reload: LiveReload,
    addr: SocketAddr,
}

impl Server {
    /// Bind a port and start watching the project.
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        config.validate()?;

        let listener = bind_available(&config.bind, config.port, PORT_ATTEMPTS).await?;
        let addr = listener
            .local_addr()
            .context("Failed to read bound address")?;

        let broadcaster = Broadcaster::new();
        let live_reload = LiveReload::start(&config, broadcaster.clone())?;

        let public_dir = config.public_dir.clone();
        let state = Arc::new(AppState {
            store: ProjectStore::new(config),
            broadcaster: broadcaster.clone(),
            port: Some(addr.port()),
        });
        let app = router(state, public_dir.as_deref());

        Ok(Self {
            listener,
            app,
            broadcaster,
            live_reload,
            addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    /// Serve until `shutdown` resolves.
    ///
    /// Open event streams are closed when shutdown starts, otherwise they
    /// would keep graceful shutdown waiting forever.
    pub async fn serve(self, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
        let broadcaster = self.broadcaster.clone();
        let signal = async move {
            shutdown.await;
            broadcaster.close_all();
        };

        info!("Serving on http://{}", self.addr);
        axum::serve(self.listener, self.app)
            .with_graceful_shutdown(signal)
            .await
            .context("Server error")?;

        self.live_reload.stop();
        info!("Server shut down");
        Ok(())
    }
}
