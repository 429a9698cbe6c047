use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use super::listing::render_listing;
use super::path_utils::{find_precompressed, sanitize_path, within_base};
use super::{Body, FileServer, Request, Response, INDEX_FILES, NOT_FOUND_PAGES};
use crate::cache_policy::{cache_headers, CacheCategory};
use crate::compression::{accepts_gzip, gzip_bytes, is_compressible};
use crate::log_error;
use crate::mime_types::content_type_header;
use crate::precompress::write_sibling;

/// Where a request path ends up on disk.
#[derive(Debug, PartialEq, Eq)]
pub enum Resolution {
    File(PathBuf),
    /// Directory requested without its trailing slash; carries the Location.
    Redirect(String),
    /// Directory with no index file.
    Listing(PathBuf),
    NotFound,
    Forbidden,
}

impl FileServer {
    pub fn resolve(&self, request: &Request) -> io::Result<Resolution> {
        let path = match sanitize_path(&self.root, &request.path)? {
            Some(p) => p,
            None => return Ok(Resolution::Forbidden),
        };

        let metadata = match fs::metadata(&path) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => return Err(e),
            Err(e) => {
                log::debug!("Not found: {} ({})", path.display(), e);
                return Ok(Resolution::NotFound);
            }
        };

        if metadata.is_dir() {
            // Relative links in the index page only resolve under a trailing slash
            if !request.path.ends_with('/') {
                // "//host" would be read as a protocol-relative URL
                let local = format!("/{}/", request.path.trim_start_matches('/'));
                let location = match &request.query {
                    Some(query) => format!("{}?{}", local, query),
                    None => local,
                };
                return Ok(Resolution::Redirect(location));
            }

            for index in INDEX_FILES {
                let candidate = path.join(index);
                if candidate.is_file() {
                    return Ok(match within_base(&self.root, &candidate) {
                        Some(resolved) => Resolution::File(resolved),
                        None => Resolution::Forbidden,
                    });
                }
            }
            return Ok(Resolution::Listing(path));
        }

        if metadata.is_file() {
            Ok(Resolution::File(path))
        } else {
            Ok(Resolution::NotFound)
        }
    }

    /// Builds the full response for one request. Never fails: I/O trouble
    /// becomes a 500, undecodable paths a 400.
    pub fn serve(&self, request: &Request) -> Response {
        let method = request.method.to_ascii_uppercase();
        if method != "GET" && method != "HEAD" {
            return Response::error(405).header("Allow", "GET, HEAD");
        }

        let result = self
            .resolve(request)
            .and_then(|resolution| self.respond(request, resolution));

        match result {
            Ok(response) => response,
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                log::debug!("Bad request path {}: {}", request.path, e);
                Response::error(400)
            }
            Err(e) => {
                log_error!(e, format!("Failed to serve {}", request.path));
                Response::text(500, &format!("500 Internal Server Error: {}\n", e.kind()))
            }
        }
    }

    fn respond(&self, request: &Request, resolution: Resolution) -> io::Result<Response> {
        match resolution {
            Resolution::File(path) => self.serve_file(request, &path),
            Resolution::Redirect(location) => {
                log::debug!("Redirecting {} → {}", request.path, location);
                Ok(Response::redirect(&location))
            }
            Resolution::Listing(dir) => {
                let html = render_listing(&dir, &request.path)?;
                Ok(Response::new(200)
                    .header("Content-Type", content_type_header("text/html"))
                    .headers(cache_headers(CacheCategory::Markup, SystemTime::now()))
                    .body(Body::Bytes(html.into_bytes())))
            }
            Resolution::NotFound => self.not_found(),
            Resolution::Forbidden => Ok(Response::error(403)),
        }
    }

    fn serve_file(&self, request: &Request, path: &Path) -> io::Result<Response> {
        let metadata = fs::metadata(path)?;
        let mime_type = self.config.mime_types.lookup(path);
        let compressible = is_compressible(&mime_type);

        let accept_encoding = request.joined_header("accept-encoding").unwrap_or_default();
        let bypass = self.config.should_bypass_compression(&request.path);
        if bypass {
            log::debug!(
                "Path '{}' matches bypass pattern, skipping compression",
                request.path
            );
        }
        let should_compress = compressible && !bypass && accepts_gzip(&accept_encoding);

        let mut response = Response::new(200)
            .header("Content-Type", content_type_header(&mime_type))
            .headers(cache_headers(CacheCategory::for_path(path), SystemTime::now()));
        if let Ok(modified) = metadata.modified() {
            response = response.header("Last-Modified", httpdate::fmt_http_date(modified));
        }
        if compressible {
            response = response.header("Vary", "Accept-Encoding");
        }

        if !should_compress {
            let file = File::open(path)?;
            return Ok(response.body(Body::File {
                file,
                len: metadata.len(),
            }));
        }

        if let Some(sibling) = find_precompressed(&self.root, path)? {
            log::debug!("Using pre-compressed file: {}", sibling.display());
            return Ok(response.gzip(fs::read(&sibling)?));
        }

        let content = fs::read(path)?;
        let compressed = gzip_bytes(&content, self.config.gzip_level)?;
        log::debug!(
            "Compressed {} on the fly: {} → {} bytes",
            path.display(),
            content.len(),
            compressed.len()
        );

        if self.config.write_gz {
            match write_sibling(path, &compressed) {
                Ok(sibling) => log::debug!("Cached {}", sibling.display()),
                Err(e) => log::warn!("Could not cache gzip for {}: {}", path.display(), e),
            }
        }

        Ok(response.gzip(compressed))
    }

    fn not_found(&self) -> io::Result<Response> {
        for page in NOT_FOUND_PAGES {
            let Some(path) = within_base(&self.root, &self.root.join(page)) else {
                continue;
            };
            if !path.is_file() {
                continue;
            }
            match fs::read(&path) {
                Ok(content) => {
                    return Ok(Response::new(404)
                        .header("Content-Type", content_type_header("text/html"))
                        .header("Cache-Control", "no-cache")
                        .body(Body::Bytes(content)));
                }
                Err(e) => log::warn!("Could not read error page {}: {}", path.display(), e),
            }
        }
        Ok(Response::error(404))
    }
}
