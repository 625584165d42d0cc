//! taskview-client: Follow a running taskview server.
//!
//! `HttpSource` fetches over the JSON API, `follow` keeps an event stream
//! open across reconnects, and `SessionDriver` feeds each frame into a
//! `ClientSession` so the view stays in sync with the project on disk.

pub mod error;
pub mod events;
pub mod http;
pub mod render;
pub mod session;

// Re-export key types for convenience
pub use error::ClientError;
pub use events::{SseDecoder, follow};
pub use http::HttpSource;
pub use render::LogRenderer;
pub use session::SessionDriver;
