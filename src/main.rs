#![forbid(unsafe_code)]

//! telemetry-hub: sensor telemetry CLI entry point.

use clap::Parser;

mod cli_app;

fn main() {
    let args = cli_app::Cli::parse();
    if let Err(e) = cli_app::run(&args) {
        eprintln!("telemetry-hub: {e}");
        std::process::exit(e.exit_code());
    }
}
