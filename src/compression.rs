use flate2::write::GzEncoder;
use flate2::Compression as GzipCompression;
use std::io::{self, Write};

#[derive(Debug, PartialEq, Copy, Clone)]
pub enum CompressionType {
    Gzip,
    None,
}

impl CompressionType {
    pub fn header_value(self) -> Option<&'static str> {
        match self {
            CompressionType::Gzip => Some("gzip"),
            CompressionType::None => None,
        }
    }
}

const COMPRESSIBLE_TYPES: &[&str] = &[
    "text/html",
    "text/css",
    "text/plain",
    "text/javascript",
    "text/xml",
    "application/javascript",
    "application/json",
    "application/xml",
    "application/rss+xml",
    "application/atom+xml",
];

/// Whether the client listed `gzip` in `Accept-Encoding` without refusing it.
pub fn accepts_gzip(accept_encoding: &str) -> bool {
    let binding = accept_encoding.to_lowercase();
    binding.split(',').any(|item| {
        let mut params = item.split(';').map(|s| s.trim());
        if params.next() != Some("gzip") {
            return false;
        }
        // gzip;q=0 means "not acceptable"
        !params.any(|p| {
            p.strip_prefix("q=")
                .and_then(|q| q.trim().parse::<f32>().ok())
                .map(|q| q <= 0.0)
                .unwrap_or(false)
        })
    })
}

/// Text types from the allow-list; images, fonts and video never qualify.
pub fn is_compressible(mime: &str) -> bool {
    let essence = mime.split(';').next().unwrap_or(mime).trim();
    COMPRESSIBLE_TYPES.contains(&essence)
}

pub fn gzip_bytes(content: &[u8], level: u32) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), GzipCompression::new(level));
    encoder.write_all(content)?;
    encoder.finish()
}
