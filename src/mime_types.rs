use std::collections::HashMap;
use std::path::Path;

use mime_guess::from_path;

use crate::error::ServerError;

const DEFAULT_TYPES: &[(&str, &str)] = &[
    ("html", "text/html"),
    ("htm", "text/html"),
    ("css", "text/css"),
    ("js", "application/javascript"),
    ("mjs", "application/javascript"),
    ("json", "application/json"),
    ("xml", "application/xml"),
    ("rss", "application/rss+xml"),
    ("txt", "text/plain"),
    ("svg", "image/svg+xml"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("ico", "image/x-icon"),
    ("woff", "font/woff"),
    ("woff2", "font/woff2"),
    ("mp4", "video/mp4"),
    ("mov", "video/quicktime"),
    ("pdf", "application/pdf"),
];

const FALLBACK: &str = "application/octet-stream";

/// Extension to content-type mapping used by one server instance.
///
/// Platform MIME databases disagree on common web types (`.js` and `.webp`
/// in particular), so a fixed default table is consulted first, with caller
/// overrides layered on top. `mime_guess` only answers for extensions
/// neither of those know.
#[derive(Debug, Clone)]
pub struct MimeTable {
    types: HashMap<String, String>,
}

impl Default for MimeTable {
    fn default() -> Self {
        let types = DEFAULT_TYPES
            .iter()
            .map(|(ext, mime)| (ext.to_string(), mime.to_string()))
            .collect();
        Self { types }
    }
}

impl MimeTable {
    pub fn new<I, K, V>(overrides: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut table = Self::default();
        for (ext, mime) in overrides {
            table.insert(ext.as_ref(), mime);
        }
        table
    }

    /// Registers `mime` for `ext`. A leading dot is accepted and ignored.
    pub fn insert(&mut self, ext: &str, mime: impl Into<String>) {
        let ext = ext.trim_start_matches('.').to_lowercase();
        self.types.insert(ext, mime.into());
    }

    /// Parses an `EXT=TYPE` override as given on the command line.
    pub fn parse_override(spec: &str) -> Result<(String, String), ServerError> {
        match spec.split_once('=') {
            Some((ext, mime)) if !ext.trim().is_empty() && mime.contains('/') => {
                Ok((ext.trim().to_string(), mime.trim().to_string()))
            }
            _ => Err(ServerError::InvalidMimeOverride(spec.to_string())),
        }
    }

    pub fn lookup(&self, path: &Path) -> String {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase());

        if let Some(mime) = ext.as_deref().and_then(|ext| self.types.get(ext)) {
            return mime.clone();
        }

        from_path(path)
            .first()
            .map(|m| m.essence_str().to_string())
            .unwrap_or_else(|| FALLBACK.to_string())
    }
}

/// Value for the `Content-Type` header, with a charset for textual types.
pub fn content_type_header(mime: &str) -> String {
    let textual = mime.starts_with("text/")
        || mime == "application/javascript"
        || mime == "application/json"
        || mime.ends_with("xml");
    if textual && !mime.contains("charset") {
        format!("{}; charset=utf-8", mime)
    } else {
        mime.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_web_assets() {
        let table = MimeTable::default();
        assert_eq!(table.lookup(Path::new("a/site.css")), "text/css");
        assert_eq!(table.lookup(Path::new("app.js")), "application/javascript");
        assert_eq!(table.lookup(Path::new("imgs/cat.WEBP")), "image/webp");
        assert_eq!(table.lookup(Path::new("clip.mov")), "video/quicktime");
    }

    #[test]
    fn overrides_take_precedence() {
        let table = MimeTable::new([(".js", "text/javascript"), ("md", "text/markdown")]);
        assert_eq!(table.lookup(Path::new("app.js")), "text/javascript");
        assert_eq!(table.lookup(Path::new("README.md")), "text/markdown");
    }

    #[test]
    fn unknown_extension_falls_back() {
        let table = MimeTable::default();
        assert_eq!(table.lookup(Path::new("blob.zzqx")), FALLBACK);
        assert_eq!(table.lookup(Path::new("Makefile")), FALLBACK);
    }

    #[test]
    fn parse_override_requires_ext_and_type() {
        assert_eq!(
            MimeTable::parse_override("webmanifest=application/manifest+json").unwrap(),
            (
                "webmanifest".to_string(),
                "application/manifest+json".to_string()
            )
        );
        assert!(MimeTable::parse_override("css").is_err());
        assert!(MimeTable::parse_override("=text/css").is_err());
        assert!(MimeTable::parse_override("css=plain").is_err());
    }

    #[test]
    fn charset_only_for_text() {
        assert_eq!(content_type_header("text/html"), "text/html; charset=utf-8");
        assert_eq!(
            content_type_header("application/rss+xml"),
            "application/rss+xml; charset=utf-8"
        );
        assert_eq!(content_type_header("image/png"), "image/png");
    }
}
