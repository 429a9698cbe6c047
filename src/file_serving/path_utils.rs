use percent_encoding::percent_decode_str;
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::Instant;

use crate::log_error;
use crate::logging::LoggingExt;
use crate::precompress::sibling_path;

/// Maps a request path onto `canonical_base`.
///
/// Returns `Ok(None)` when the target would end up outside the base, either
/// lexically or through a symlink. Paths that don't exist yet are returned
/// as joined so the caller can answer 404.
pub fn sanitize_path(canonical_base: &Path, request_path: &str) -> io::Result<Option<PathBuf>> {
    let start_time = Instant::now();

    let decoded_path = request_path.log_operation("decode_path", || {
        percent_decode_str(request_path)
            .decode_utf8()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    })?;

    if decoded_path.contains('\0') {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "NUL byte in request path",
        ));
    }

    // ".." pops one segment but never climbs above the base; root and
    // drive prefixes are dropped
    let mut segments: Vec<&OsStr> = Vec::new();
    for component in Path::new(decoded_path.as_ref()).components() {
        match component {
            Component::Normal(name) => segments.push(name),
            Component::ParentDir => {
                segments.pop();
            }
            _ => {}
        }
    }
    let cleaned_path = segments.iter().collect::<PathBuf>();
    log::trace!("Cleaned path: {}", cleaned_path.display());

    let requested_path = canonical_base.join(&cleaned_path);

    match fs::canonicalize(&requested_path) {
        Ok(path) => {
            log::trace!(
                "Path sanitization complete in {:?} - result: {}",
                start_time.elapsed(),
                path.display()
            );
            if path.starts_with(canonical_base) {
                Ok(Some(path))
            } else {
                log::warn!("Path escapes base directory: {}", path.display());
                Ok(None)
            }
        }
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            log_error!(
                e,
                format!("Failed to canonicalize path: {}", requested_path.display())
            );
            Err(e)
        }
        Err(_) => {
            // Missing (or a file used as a directory); the caller sees it as absent
            log::trace!(
                "Using non-canonicalized path: {}",
                requested_path.display()
            );
            Ok(Some(requested_path))
        }
    }
}

/// Finds the `.gz` sibling of `path`, if it is a regular file inside the base.
pub fn find_precompressed(canonical_base: &Path, path: &Path) -> io::Result<Option<PathBuf>> {
    let compressed_path = sibling_path(path);
    log::trace!("Checking compressed path: {}", compressed_path.display());

    match fs::canonicalize(&compressed_path) {
        Ok(resolved) if !resolved.starts_with(canonical_base) => {
            log::warn!(
                "Ignoring sibling outside base directory: {}",
                resolved.display()
            );
            Ok(None)
        }
        Ok(resolved) => {
            let metadata = fs::metadata(&resolved)?;
            Ok(metadata.is_file().then_some(resolved))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Canonical form of `path` if it exists and stays inside the base.
pub fn within_base(canonical_base: &Path, path: &Path) -> Option<PathBuf> {
    fs::canonicalize(path)
        .ok()
        .filter(|resolved| resolved.starts_with(canonical_base))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn site() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let base = fs::canonicalize(dir.path()).unwrap();
        fs::create_dir(base.join("imgs")).unwrap();
        fs::write(base.join("index.html"), "home").unwrap();
        fs::write(base.join("imgs/cat one.png"), "png").unwrap();
        (dir, base)
    }

    #[test]
    fn resolves_plain_and_encoded_paths() {
        let (_dir, base) = site();
        assert_eq!(
            sanitize_path(&base, "/index.html").unwrap(),
            Some(base.join("index.html"))
        );
        assert_eq!(
            sanitize_path(&base, "/imgs/cat%20one.png").unwrap(),
            Some(base.join("imgs/cat one.png"))
        );
        assert_eq!(sanitize_path(&base, "/").unwrap(), Some(base.clone()));
    }

    #[test]
    fn traversal_is_clamped_to_base() {
        let (_dir, base) = site();
        assert_eq!(
            sanitize_path(&base, "/../../etc/passwd").unwrap(),
            Some(base.join("etc/passwd"))
        );
        assert_eq!(
            sanitize_path(&base, "/imgs/%2e%2e/%2e%2e/index.html").unwrap(),
            Some(base.join("index.html"))
        );
        assert_eq!(
            sanitize_path(&base, "/imgs/./../index.html").unwrap(),
            Some(base.join("index.html"))
        );
        assert_eq!(
            sanitize_path(&base, "/a/b/../../../imgs/cat%20one.png").unwrap(),
            Some(base.join("imgs/cat one.png"))
        );
    }

    #[cfg(unix)]
    #[test]
    fn symlink_out_of_base_is_rejected() {
        let (_dir, base) = site();
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("secret.txt"), "s").unwrap();
        std::os::unix::fs::symlink(outside.path(), base.join("leak")).unwrap();

        assert_eq!(sanitize_path(&base, "/leak/secret.txt").unwrap(), None);
    }

    #[test]
    fn invalid_encoding_is_invalid_data() {
        let (_dir, base) = site();
        let err = sanitize_path(&base, "/%ff%fe").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        let err = sanitize_path(&base, "/a%00b").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn finds_sibling_only_when_present() {
        let (_dir, base) = site();
        let index = base.join("index.html");
        assert_eq!(find_precompressed(&base, &index).unwrap(), None);

        fs::write(base.join("index.html.gz"), "gz").unwrap();
        assert_eq!(
            find_precompressed(&base, &index).unwrap(),
            Some(base.join("index.html.gz"))
        );

        // A directory named like a sibling doesn't count
        fs::create_dir(base.join("imgs/cat one.png.gz")).unwrap();
        assert_eq!(
            find_precompressed(&base, &base.join("imgs/cat one.png")).unwrap(),
            None
        );
    }
}
