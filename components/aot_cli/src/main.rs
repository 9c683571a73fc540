//! Corten AOT tool
//!
//! Entry point. Parses CLI arguments, installs logging and delegates to
//! [`aot_cli::run`].

use aot_cli::Cli;
use clap::Parser as ClapParser;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();

    // RUST_LOG=corten::constpool=trace etc.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let stdout = std::io::stdout();
    if let Err(e) = aot_cli::run(&cli, &mut stdout.lock()) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
