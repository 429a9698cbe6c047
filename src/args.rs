use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Static site server with gzip siblings and cache headers", long_about = None)]
pub struct Args {
    /// Directory to serve
    #[arg(short = 'd', long, default_value = ".")]
    pub root: PathBuf,

    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    pub host: String,

    #[arg(short, long, default_value = "8000")]
    pub port: u16,

    /// Consecutive ports to try when the requested one is taken (1 disables fallback)
    #[arg(long, default_value = "10", value_parser = clap::value_parser!(u16).range(1..))]
    pub port_attempts: u16,

    #[arg(short, long, default_value = "6", value_parser = clap::value_parser!(u32).range(0..=9))]
    pub gzip_level: u32,

    /// Extra content type, as EXT=TYPE (repeatable)
    #[arg(long = "mime", value_name = "EXT=TYPE")]
    pub mime_overrides: Vec<String>,

    /// Request paths matching this regex are never compressed (repeatable)
    #[arg(long = "bypass", value_name = "REGEX")]
    pub bypass_patterns: Vec<String>,

    /// Do not store on-the-fly gzip output as .gz siblings
    #[arg(long)]
    pub no_write_gz: bool,

    /// Refresh stale .gz siblings before serving
    #[arg(long)]
    pub precompress: bool,

    /// Refresh stale .gz siblings and exit
    #[arg(long, conflicts_with = "precompress")]
    pub precompress_only: bool,

    /// Socket read/write timeout in seconds (0 disables)
    #[arg(long, default_value = "30")]
    pub timeout: u64,
}
