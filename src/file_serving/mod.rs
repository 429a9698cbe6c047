pub mod handlers;
mod listing;
mod path_utils;
pub mod response;

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::ServerConfig;
use crate::error::ServerError;

pub use handlers::Resolution;
pub use response::{Body, Response};

pub const INDEX_FILES: &[&str] = &["index.html", "index.htm"];

/// Custom error pages, first match wins.
pub const NOT_FOUND_PAGES: &[&str] = &["404.html", "shared/404.html"];

/// One parsed request head.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    pub target: String,
    /// Path part of the target, still percent-encoded.
    pub path: String,
    pub query: Option<String>,
    pub headers: Vec<(String, String)>,
}

impl Request {
    pub fn new(
        method: impl Into<String>,
        target: impl Into<String>,
        headers: Vec<(String, String)>,
    ) -> Self {
        let target = target.into();
        let without_fragment = target.split('#').next().unwrap_or(&target);
        let (path, query) = match without_fragment.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query.to_string())),
            None => (without_fragment.to_string(), None),
        };
        let path = if path.is_empty() { "/".to_string() } else { path };

        Self {
            method: method.into(),
            target,
            path,
            query,
            headers,
        }
    }

    pub fn get(target: &str) -> Self {
        Self::new("GET", target, Vec::new())
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values of a repeated header, comma-joined as if sent on one line.
    pub fn joined_header(&self, name: &str) -> Option<String> {
        let values = self
            .headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect::<Vec<_>>();
        if values.is_empty() {
            None
        } else {
            Some(values.join(", "))
        }
    }

    pub fn is_head(&self) -> bool {
        self.method.eq_ignore_ascii_case("HEAD")
    }
}

/// Serves files from one canonical root directory.
#[derive(Debug)]
pub struct FileServer {
    root: PathBuf,
    config: ServerConfig,
}

impl FileServer {
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        let root = fs::canonicalize(&config.root).map_err(|source| ServerError::InvalidRoot {
            path: config.root.clone(),
            source,
        })?;
        if !root.is_dir() {
            return Err(ServerError::RootNotDirectory(root));
        }
        Ok(Self { root, config })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn request_splits_query_and_fragment() {
        let req = Request::get("/chapters/one.html?ref=rss#top");
        assert_eq!(req.path, "/chapters/one.html");
        assert_eq!(req.query.as_deref(), Some("ref=rss"));

        let req = Request::get("");
        assert_eq!(req.path, "/");
        assert!(req.query.is_none());
    }

    #[test]
    fn headers_are_case_insensitive() {
        let req = Request::get("/").with_header("Accept-Encoding", "gzip");
        assert_eq!(req.header("accept-encoding"), Some("gzip"));
        assert_eq!(req.header("ACCEPT-ENCODING"), Some("gzip"));
        assert_eq!(req.header("range"), None);
    }

    #[test]
    fn repeated_headers_are_joined() {
        let req = Request::get("/")
            .with_header("Accept-Encoding", "br")
            .with_header("accept-encoding", "gzip;q=0.5");
        assert_eq!(req.header("accept-encoding"), Some("br"));
        assert_eq!(req.joined_header("Accept-Encoding").as_deref(), Some("br, gzip;q=0.5"));
        assert_eq!(req.joined_header("range"), None);
    }

    #[test]
    fn root_is_validated() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("index.html");
        fs::write(&file, "x").unwrap();

        assert!(FileServer::new(ServerConfig::new(dir.path())).is_ok());
        assert!(matches!(
            FileServer::new(ServerConfig::new(&file)),
            Err(ServerError::RootNotDirectory(_))
        ));
        assert!(matches!(
            FileServer::new(ServerConfig::new(dir.path().join("nope"))),
            Err(ServerError::InvalidRoot { .. })
        ));
    }
}
