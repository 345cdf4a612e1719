//! `tagstore` binary: parses the command line and dispatches to
//! [`tagstore::cli::execute`]. See the library crate for the server,
//! service and mirror.

use clap::Parser;
use tagstore::{cli, telemetry};

#[tokio::main]
async fn main() {
    telemetry::init(telemetry::LogFormat::from_env());

    let cli = cli::Cli::parse();
    if !cli.quiet && !cli.json_mode {
        eprintln!("tagstore v{}", env!("CARGO_PKG_VERSION"));
    }

    if let Err(e) = cli::execute(cli).await {
        tracing::error!(error = %e, "Command failed");
        std::process::exit(1);
    }
}
