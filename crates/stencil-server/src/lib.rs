//! Development server for stencil sites.
//!
//! Builds the site once, serves the output directory, and rebuilds the whole
//! site whenever a watched input changes, telling connected browsers to
//! reload after every successful rebuild.

pub mod server;
pub mod watcher;
pub mod websocket;

pub use server::{router, ConfigLoader, DevServer, DevServerConfig, ServerError, ServerState};
pub use watcher::{FileWatcher, WatchEvent, WatchTargets};
pub use websocket::{ReloadHub, ReloadMessage};
