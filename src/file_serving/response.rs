use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::time::SystemTime;

use crate::cache_policy::SECURITY_HEADERS;
use crate::compression::CompressionType;

const SERVER_NAME: &str = concat!("sitesrv/", env!("CARGO_PKG_VERSION"));

pub enum Body {
    Empty,
    Bytes(Vec<u8>),
    /// Streamed from disk; `len` is the size reported in `Content-Length`.
    File { file: File, len: u64 },
}

impl Body {
    pub fn content_length(&self) -> u64 {
        match self {
            Body::Empty => 0,
            Body::Bytes(bytes) => bytes.len() as u64,
            Body::File { len, .. } => *len,
        }
    }
}

impl std::fmt::Debug for Body {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Body::Empty => write!(f, "Empty"),
            Body::Bytes(bytes) => write!(f, "Bytes({})", bytes.len()),
            Body::File { len, .. } => write!(f, "File({})", len),
        }
    }
}

#[derive(Debug)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub encoding: CompressionType,
    pub body: Body,
}

pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        301 => "Moved Permanently",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

impl Response {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            encoding: CompressionType::None,
            body: Body::Empty,
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn headers(mut self, headers: impl IntoIterator<Item = (String, String)>) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    pub fn gzip(mut self, compressed: Vec<u8>) -> Self {
        self.encoding = CompressionType::Gzip;
        self.body = Body::Bytes(compressed);
        self
    }

    /// Plain-text error or status page; never cached.
    pub fn text(status: u16, message: &str) -> Self {
        Self::new(status)
            .header("Content-Type", "text/plain; charset=utf-8")
            .header("Cache-Control", "no-cache")
            .body(Body::Bytes(message.as_bytes().to_vec()))
    }

    pub fn error(status: u16) -> Self {
        Self::text(status, &format!("{} {}\n", status, reason_phrase(status)))
    }

    pub fn redirect(location: &str) -> Self {
        Self::new(301)
            .header("Location", location)
            .header("Content-Type", "text/plain; charset=utf-8")
            .header("Cache-Control", "no-cache")
            .body(Body::Bytes(format!("Moved to {}\n", location).into_bytes()))
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Writes the status line, headers and (unless `include_body` is false)
    /// the body. Returns the number of body bytes sent.
    pub fn write_to<W: Write>(self, writer: W, include_body: bool) -> io::Result<u64> {
        let mut out = BufWriter::new(writer);

        write!(out, "HTTP/1.1 {} {}\r\n", self.status, reason_phrase(self.status))?;
        write!(out, "Date: {}\r\n", httpdate::fmt_http_date(SystemTime::now()))?;
        write!(out, "Server: {}\r\n", SERVER_NAME)?;
        for (key, value) in &self.headers {
            write!(out, "{}: {}\r\n", key, value)?;
        }
        if let Some(encoding) = self.encoding.header_value() {
            write!(out, "Content-Encoding: {}\r\n", encoding)?;
        }
        for (key, value) in SECURITY_HEADERS {
            write!(out, "{}: {}\r\n", key, value)?;
        }
        write!(out, "Content-Length: {}\r\n", self.body.content_length())?;
        out.write_all(b"Connection: close\r\n\r\n")?;

        let sent = if include_body {
            match self.body {
                Body::Empty => 0,
                Body::Bytes(bytes) => {
                    out.write_all(&bytes)?;
                    bytes.len() as u64
                }
                Body::File { file, len } => {
                    let copied = io::copy(&mut file.take(len), &mut out)?;
                    if copied < len {
                        // File shrank after stat; Content-Length is already out
                        return Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            format!("file truncated: sent {} of {} bytes", copied, len),
                        ));
                    }
                    copied
                }
            }
        } else {
            0
        };

        out.flush()?;
        Ok(sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(response: Response, include_body: bool) -> String {
        let mut buf = Vec::new();
        response.write_to(&mut buf, include_body).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn writes_security_headers_and_length() {
        let text = render(Response::error(404), true);
        assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(text.contains("X-Content-Type-Options: nosniff\r\n"));
        assert!(text.contains("X-Frame-Options: DENY\r\n"));
        assert!(text.contains("X-XSS-Protection: 1; mode=block\r\n"));
        assert!(text.contains("Referrer-Policy: strict-origin-when-cross-origin\r\n"));
        assert!(text.contains("Content-Length: 14\r\n"));
        assert!(text.ends_with("\r\n\r\n404 Not Found\n"));
    }

    #[test]
    fn head_keeps_length_but_drops_body() {
        let response = Response::new(200).body(Body::Bytes(b"hello".to_vec()));
        let text = render(response, false);
        assert!(text.contains("Content-Length: 5\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn gzip_sets_content_encoding() {
        let text = render(Response::new(200).gzip(vec![1, 2, 3]), false);
        assert!(text.contains("Content-Encoding: gzip\r\n"));
        assert!(text.contains("Content-Length: 3\r\n"));
    }

    #[test]
    fn redirect_carries_location() {
        let response = Response::redirect("/chapters/");
        assert_eq!(response.header_value("location"), Some("/chapters/"));
        assert_eq!(response.status, 301);
    }
}
