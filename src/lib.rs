//! Development server for a static website.
//!
//! Files are served from one root directory with index fallback, trailing
//! slash redirects, gzip (from a `.gz` sibling when present, otherwise on the
//! fly) for text types, and cache/security headers chosen by file type.
//! [`precompress::precompress_tree`] refreshes the `.gz` siblings ahead of time.

pub mod args;
pub mod cache_policy;
pub mod compression;
pub mod config;
pub mod error;
pub mod file_serving;
pub mod logging;
pub mod mime_types;
pub mod precompress;
pub mod server;

pub use config::ServerConfig;
pub use error::ServerError;
pub use file_serving::{FileServer, Request, Response};
pub use server::{Server, ShutdownHandle};
