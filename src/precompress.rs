//! Ahead-of-time gzip siblings.
//!
//! The request path never checks whether a `.gz` sibling is older than its
//! source, so this pass is the only place stale siblings get replaced. Run it
//! after content changes (`--precompress` / `--precompress-only`).

use std::ffi::OsString;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::compression::{gzip_bytes, is_compressible};
use crate::log_error;
use crate::logging::LoggingExt;
use crate::mime_types::MimeTable;

const SIBLING_SUFFIX: &str = ".gz";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// `<path>.gz`
pub fn sibling_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(SIBLING_SUFFIX);
    PathBuf::from(name)
}

/// Writes `compressed` as the sibling of `source` via a temporary file and a
/// rename, so concurrent readers see either the old sibling or the new one.
///
/// Two writers racing on the same sibling both succeed; the last rename wins
/// and the content is identical for the same source and level.
pub fn write_sibling(source: &Path, compressed: &[u8]) -> io::Result<PathBuf> {
    let target = sibling_path(source);
    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = target.with_file_name(format!(
        ".{}.{}.{}.tmp",
        file_name,
        std::process::id(),
        TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));

    let result = (|| {
        let mut file = fs::File::create(&temp)?;
        file.write_all(compressed)?;
        file.sync_all()?;
        fs::rename(&temp, &target)
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&temp);
        return Err(e);
    }
    Ok(target)
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PrecompressStats {
    /// Compressible files looked at.
    pub scanned: usize,
    pub compressed: usize,
    pub up_to_date: usize,
    pub failed: usize,
    pub bytes_in: u64,
    pub bytes_out: u64,
}

/// Refreshes every missing or stale `.gz` sibling under `root`.
pub fn precompress_tree(root: &Path, mime_types: &MimeTable, level: u32) -> io::Result<PrecompressStats> {
    let start_time = Instant::now();
    let mut stats = PrecompressStats::default();

    let root_meta = root
        .display()
        .log_operation("stat root", || fs::metadata(root))?;
    if !root_meta.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} is not a directory", root.display()),
        ));
    }

    let root = fs::canonicalize(root)?;
    walk(&root, &root, mime_types, level, &mut stats)?;

    log::info!(
        "Precompressed {} of {} files ({} up to date, {} failed) in {:?}: {} → {} bytes",
        stats.compressed,
        stats.scanned,
        stats.up_to_date,
        stats.failed,
        start_time.elapsed(),
        stats.bytes_in,
        stats.bytes_out
    );
    Ok(stats)
}

fn walk(
    root: &Path,
    dir: &Path,
    mime_types: &MimeTable,
    level: u32,
    stats: &mut PrecompressStats,
) -> io::Result<()> {
    let mut entries = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .collect::<Vec<_>>();
    entries.sort();

    for path in entries {
        let meta = match fs::symlink_metadata(&path) {
            Ok(meta) => meta,
            Err(e) => {
                log_error!(e, format!("Cannot stat {}", path.display()));
                stats.failed += 1;
                continue;
            }
        };

        // Linked files are served like regular ones when they resolve inside
        // the root; linked directories are never descended into
        let meta = if meta.file_type().is_symlink() {
            match linked_file(root, &path) {
                Some(target_meta) => target_meta,
                None => {
                    log::debug!("Skipping link {}", path.display());
                    continue;
                }
            }
        } else {
            meta
        };

        if meta.is_dir() {
            if let Err(e) = walk(root, &path, mime_types, level, stats) {
                log_error!(e, format!("Cannot read directory {}", path.display()));
                stats.failed += 1;
            }
            continue;
        }
        if !meta.is_file() || is_generated(&path) {
            continue;
        }
        if !is_compressible(&mime_types.lookup(&path)) {
            continue;
        }

        stats.scanned += 1;
        match refresh_sibling(&path, &meta, level) {
            Ok(Some((bytes_in, bytes_out))) => {
                stats.compressed += 1;
                stats.bytes_in += bytes_in;
                stats.bytes_out += bytes_out;
            }
            Ok(None) => stats.up_to_date += 1,
            Err(e) => {
                log_error!(e, format!("Failed to precompress {}", path.display()));
                stats.failed += 1;
            }
        }
    }
    Ok(())
}

/// Metadata of the regular file a symlink points at, if it stays under `root`.
fn linked_file(root: &Path, link: &Path) -> Option<fs::Metadata> {
    let target = fs::canonicalize(link).ok()?;
    if !target.starts_with(root) {
        return None;
    }
    fs::metadata(&target).ok().filter(|meta| meta.is_file())
}

fn is_generated(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();
    name.ends_with(SIBLING_SUFFIX) || (name.starts_with('.') && name.ends_with(".tmp"))
}

/// Returns `Some((source_len, compressed_len))` when the sibling was rewritten.
fn refresh_sibling(path: &Path, meta: &fs::Metadata, level: u32) -> io::Result<Option<(u64, u64)>> {
    let sibling = sibling_path(path);
    if let Ok(sibling_meta) = fs::metadata(&sibling) {
        if sibling_meta.is_file() && sibling_meta.modified()? >= meta.modified()? {
            log::debug!("Up to date: {}", sibling.display());
            return Ok(None);
        }
    }

    let content = fs::read(path)?;
    let compressed = gzip_bytes(&content, level)?;
    write_sibling(path, &compressed)?;
    log::debug!(
        "Wrote {} ({} → {} bytes)",
        sibling.display(),
        content.len(),
        compressed.len()
    );
    Ok(Some((content.len() as u64, compressed.len() as u64)))
}
