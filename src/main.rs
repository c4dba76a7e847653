mod cli;
mod execute;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::CLI;

fn main() -> Result<()> {
    init_tracing();
    let cli = CLI::parse();
    execute::execute(cli)
}

/// `TECHUP_DEBUG=1` turns on debug traces; `RUST_LOG` still wins when
/// set explicitly.
fn init_tracing() {
    let default = if matches!(std::env::var("TECHUP_DEBUG").as_deref(), Ok("1") | Ok("true")) {
        "techup=debug"
    } else {
        "techup=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
