//! Spotseek - look up study spots from the command line

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use spotseek::cli::Cli;

/// Initializes logging to stderr.
///
/// `--debug` forces debug output for this crate; otherwise `RUST_LOG` is
/// honoured, defaulting to info.
fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("spotseek=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("spotseek=info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    tracing::debug!("spotseek starting with args: {:?}", cli);

    match cli.run().await {
        Ok(output) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(1)
        }
    }
}
