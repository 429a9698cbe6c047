use clap::Parser;
use std::process::ExitCode;

use sitesrv::args::Args;
use sitesrv::logging::setup_logging;
use sitesrv::precompress::precompress_tree;
use sitesrv::{Server, ServerConfig, ServerError};

fn run(args: Args) -> Result<(), ServerError> {
    let precompress = args.precompress || args.precompress_only;
    let precompress_only = args.precompress_only;
    let config = ServerConfig::try_from(args)?;

    if precompress {
        precompress_tree(&config.root, &config.mime_types, config.gzip_level).map_err(|source| {
            ServerError::InvalidRoot {
                path: config.root.clone(),
                source,
            }
        })?;
        if precompress_only {
            return Ok(());
        }
    }

    let server = Server::bind(config)?;
    server.install_signal_handlers()?;
    println!("✨ serving at http://{} (press Ctrl+C to stop)", server.local_addr()?);
    server.run()?;
    Ok(())
}

fn main() -> ExitCode {
    setup_logging();
    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("❌ {}", e);
            ExitCode::FAILURE
        }
    }
}
