//! Upstage patcher entry point

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use upstage_patcher::{run, usage_failure, Cli};
use upstage_resources::platform_store;

fn main() -> std::process::ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => return usage_failure(e).to_exit_code(),
    };

    let filter = if cli.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let store = platform_store();
    run(&cli, store.as_ref()).to_exit_code()
}
