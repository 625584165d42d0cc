//! taskview-server: HTTP viewer for a Task Master project with live reload.
//!
//! Serves the task database and requirement documents as JSON, and pushes
//! change notifications to browsers over Server-Sent Events.

pub mod api;
pub mod broadcast;
pub mod config;
pub mod debounce;
pub mod server;
pub mod store;
pub mod watcher;

// Re-export key types for convenience
pub use broadcast::{Broadcaster, Subscriber};
pub use config::{ServerArgs, ServerConfig};
pub use debounce::Debouncer;
pub use server::{LiveReload, Server};
pub use store::{ProjectStore, StoreError};
pub use watcher::{FileWatcher, RawChange, Relevance, WatchTarget};
