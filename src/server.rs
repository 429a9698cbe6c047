use log::{debug, info, warn};
use std::io::{self, BufRead, BufReader, Read};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::ServerConfig;
use crate::error::{is_disconnect, Result, ServerError};
use crate::file_serving::{FileServer, Request, Response};
use crate::{log_error, log_request, log_response};

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);
const MAX_HEAD_BYTES: u64 = 16 * 1024;
const MAX_HEADERS: usize = 100;

/// Stops a running [`Server`] from another thread.
#[derive(Debug, Clone)]
pub struct ShutdownHandle(Arc<AtomicBool>);

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct Server {
    listener: TcpListener,
    files: Arc<FileServer>,
    timeout: Option<Duration>,
    shutdown: Arc<AtomicBool>,
}

impl Server {
    /// Validates the root and binds, walking up from `config.port` while
    /// ports are taken.
    pub fn bind(config: ServerConfig) -> Result<Self> {
        let host = config.host.clone();
        let (port, attempts, timeout) = (config.port, config.port_attempts, config.timeout);
        let files = FileServer::new(config)?;
        let listener = bind_with_fallback(&host, port, attempts)?;

        Ok(Self {
            listener,
            files: Arc::new(files),
            timeout,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(Arc::clone(&self.shutdown))
    }

    /// Routes SIGINT/SIGTERM to an orderly shutdown.
    pub fn install_signal_handlers(&self) -> Result<()> {
        for &signal in signal_hook::consts::TERM_SIGNALS {
            signal_hook::flag::register(signal, Arc::clone(&self.shutdown))
                .map_err(ServerError::Signal)?;
        }
        Ok(())
    }

    /// Accepts until shut down, then waits for in-flight connections.
    pub fn run(self) -> io::Result<()> {
        self.listener.set_nonblocking(true)?;
        info!(
            "Serving {} on http://{}",
            self.files.root().display(),
            self.listener.local_addr()?
        );

        let mut workers: Vec<JoinHandle<()>> = Vec::new();

        while !self.shutdown.load(Ordering::SeqCst) {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    workers.retain(|handle| !handle.is_finished());

                    let files = Arc::clone(&self.files);
                    let timeout = self.timeout;
                    let spawned = thread::Builder::new()
                        .name(format!("conn-{}", peer))
                        .spawn(move || handle_connection(stream, peer, &files, timeout));
                    match spawned {
                        Ok(handle) => workers.push(handle),
                        Err(e) => log_error!(e, format!("Failed to spawn handler for {}", peer)),
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    // e.g. out of file descriptors; keep the loop alive
                    log_error!(e, "Accept failed");
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
            }
        }

        info!(
            "Shutting down, waiting for {} connection(s)",
            workers.iter().filter(|h| !h.is_finished()).count()
        );
        for handle in workers {
            if handle.join().is_err() {
                warn!("A connection handler panicked");
            }
        }
        info!("Server stopped");
        Ok(())
    }
}

pub fn bind_with_fallback(host: &str, port: u16, attempts: u16) -> Result<TcpListener> {
    for offset in 0..attempts.max(1) {
        let Some(candidate) = port.checked_add(offset) else {
            break;
        };
        match TcpListener::bind((host, candidate)) {
            Ok(listener) => {
                if offset > 0 {
                    info!("Bound to fallback port {}", candidate);
                }
                return Ok(listener);
            }
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                warn!("❌ port {} in use, trying port {}...", candidate, candidate.wrapping_add(1));
            }
            Err(source) => {
                return Err(ServerError::Bind {
                    addr: format!("{}:{}", host, candidate),
                    source,
                });
            }
        }
    }

    Err(ServerError::PortsExhausted {
        host: host.to_string(),
        first: port,
        attempts,
    })
}

/// Reads the request line and headers. `Ok(None)` means the peer closed the
/// connection without sending anything.
pub fn read_request<R: BufRead>(reader: &mut R) -> io::Result<Option<Request>> {
    let mut first_line = String::new();
    if reader.read_line(&mut first_line)? == 0 {
        return Ok(None);
    }

    let mut parts = first_line.split_whitespace();
    let (method, target) = match (parts.next(), parts.next(), parts.next()) {
        (Some(method), Some(target), Some(version)) if version.starts_with("HTTP/") => {
            (method.to_string(), target.to_string())
        }
        _ => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("malformed request line: {:?}", first_line.trim()),
            ))
        }
    };

    let mut headers = Vec::new();
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 || line.trim().is_empty() {
            break;
        }
        if headers.len() == MAX_HEADERS {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "too many headers"));
        }
        debug!("Header line: {}", line.trim());
        if let Some((key, value)) = line.split_once(':') {
            headers.push((key.trim().to_string(), value.trim().to_string()));
        }
    }

    Ok(Some(Request::new(method, target, headers)))
}

fn handle_connection(stream: TcpStream, peer: SocketAddr, files: &FileServer, timeout: Option<Duration>) {
    let prepared = stream
        .set_nonblocking(false)
        .and_then(|_| stream.set_read_timeout(timeout))
        .and_then(|_| stream.set_write_timeout(timeout));
    if let Err(e) = prepared {
        log_error!(e, format!("Failed to configure socket for {}", peer));
        return;
    }

    match serve_connection(&stream, peer, files) {
        Ok(()) => {}
        Err(e) if is_disconnect(&e) => debug!("Client {} disconnected: {}", peer, e),
        Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
            debug!("Client {} timed out", peer)
        }
        Err(e) => log_error!(e, format!("Error handling connection from {}", peer)),
    }
}

fn serve_connection(stream: &TcpStream, peer: SocketAddr, files: &FileServer) -> io::Result<()> {
    let start_time = Instant::now();
    let mut reader = BufReader::new(stream.take(MAX_HEAD_BYTES));

    let request = match read_request(&mut reader) {
        Ok(Some(request)) => request,
        Ok(None) => return Ok(()),
        Err(e) if e.kind() == io::ErrorKind::InvalidData => {
            debug!("Bad request from {}: {}", peer, e);
            Response::error(400).write_to(stream, true)?;
            return Ok(());
        }
        Err(e) => return Err(e),
    };
    log_request!(peer, request.method, request.target);

    let response = files.serve(&request);
    let status = response.status;
    let encoding = response.encoding.header_value();
    let sent = response.write_to(stream, !request.is_head())?;
    log_response!(status, start_time.elapsed(), encoding, sent);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parses_request_head() {
        let raw = "GET /chapters/?page=2 HTTP/1.1\r\nHost: localhost\r\nAccept-Encoding: gzip, br\r\n\r\n";
        let request = read_request(&mut Cursor::new(raw)).unwrap().unwrap();
        assert_eq!(request.method, "GET");
        assert_eq!(request.path, "/chapters/");
        assert_eq!(request.query.as_deref(), Some("page=2"));
        assert_eq!(request.header("accept-encoding"), Some("gzip, br"));
    }

    #[test]
    fn empty_stream_is_not_a_request() {
        assert!(read_request(&mut Cursor::new("")).unwrap().is_none());
    }

    #[test]
    fn malformed_line_is_invalid_data() {
        let err = read_request(&mut Cursor::new("garbage\r\n\r\n")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn too_many_headers_is_invalid_data() {
        let mut raw = String::from("GET / HTTP/1.1\r\n");
        for i in 0..=MAX_HEADERS {
            raw.push_str(&format!("X-H{}: v\r\n", i));
        }
        raw.push_str("\r\n");
        let err = read_request(&mut Cursor::new(raw)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn falls_back_to_next_port() {
        let taken = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();

        match bind_with_fallback("127.0.0.1", port, 1) {
            Err(ServerError::PortsExhausted { first, attempts, .. }) => {
                assert_eq!((first, attempts), (port, 1));
            }
            other => panic!("expected PortsExhausted, got {:?}", other.map(|_| ())),
        }

        // The next port may itself be busy on a shared machine, so allow a few
        if let Ok(listener) = bind_with_fallback("127.0.0.1", port, 20) {
            assert_ne!(listener.local_addr().unwrap().port(), port);
        }
    }
}
