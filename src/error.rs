use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServerError>;

/// Faults that stop the server before (or instead of) serving requests.
///
/// Per-request failures never surface here; they are answered on the
/// connection and logged by the accept loop.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("cannot open root directory {path}: {source}")]
    InvalidRoot {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("root {0} is not a directory")]
    RootNotDirectory(PathBuf),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("no free port on {host}: tried {attempts} ports starting at {first}")]
    PortsExhausted { host: String, first: u16, attempts: u16 },

    #[error("invalid MIME override '{0}', expected EXT=TYPE")]
    InvalidMimeOverride(String),

    #[error("invalid bypass pattern: {0}")]
    InvalidBypassPattern(#[from] regex::Error),

    #[error("failed to install signal handler: {0}")]
    Signal(#[source] io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// True for errors that mean the peer went away mid-exchange.
///
/// These end the connection quietly instead of being reported as faults.
pub fn is_disconnect(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::NotConnected
    )
}
