use regex::Regex;
use std::path::PathBuf;
use std::time::Duration;

use crate::args::Args;
use crate::error::ServerError;
use crate::mime_types::MimeTable;

/// Everything one server instance needs, validated from the command line.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub root: PathBuf,
    pub host: String,
    pub port: u16,
    pub port_attempts: u16,
    pub gzip_level: u32,
    pub mime_types: MimeTable,
    pub bypass_patterns: Vec<Regex>,
    /// Persist on-the-fly gzip output next to the source.
    pub write_gz: bool,
    pub timeout: Option<Duration>,
}

impl ServerConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            host: "127.0.0.1".to_string(),
            port: 8000,
            port_attempts: 10,
            gzip_level: 6,
            mime_types: MimeTable::default(),
            bypass_patterns: Vec::new(),
            write_gz: true,
            timeout: Some(Duration::from_secs(30)),
        }
    }

    pub fn should_bypass_compression(&self, request_path: &str) -> bool {
        self.bypass_patterns
            .iter()
            .any(|pattern| pattern.is_match(request_path))
    }
}

impl TryFrom<Args> for ServerConfig {
    type Error = ServerError;

    fn try_from(args: Args) -> Result<Self, Self::Error> {
        let overrides = args
            .mime_overrides
            .iter()
            .map(|spec| MimeTable::parse_override(spec))
            .collect::<Result<Vec<_>, _>>()?;

        let bypass_patterns = args
            .bypass_patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            root: args.root,
            host: args.host,
            port: args.port,
            port_attempts: args.port_attempts,
            gzip_level: args.gzip_level,
            mime_types: MimeTable::new(overrides),
            bypass_patterns,
            write_gz: !args.no_write_gz,
            timeout: (args.timeout > 0).then(|| Duration::from_secs(args.timeout)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::path::Path;

    #[test]
    fn builds_from_args() {
        let args = Args::parse_from([
            "sitesrv",
            "--mime",
            "md=text/markdown",
            "--bypass",
            r"\.map$",
            "--no-write-gz",
            "--timeout",
            "0",
        ]);
        let config = ServerConfig::try_from(args).unwrap();
        assert_eq!(config.mime_types.lookup(Path::new("a.md")), "text/markdown");
        assert!(config.should_bypass_compression("/js/app.js.map"));
        assert!(!config.should_bypass_compression("/js/app.js"));
        assert!(!config.write_gz);
        assert!(config.timeout.is_none());
    }

    #[test]
    fn bad_override_or_pattern_is_rejected() {
        let args = Args::parse_from(["sitesrv", "--mime", "nonsense"]);
        assert!(matches!(
            ServerConfig::try_from(args),
            Err(ServerError::InvalidMimeOverride(_))
        ));

        let args = Args::parse_from(["sitesrv", "--bypass", "("]);
        assert!(matches!(
            ServerConfig::try_from(args),
            Err(ServerError::InvalidBypassPattern(_))
        ));
    }
}
