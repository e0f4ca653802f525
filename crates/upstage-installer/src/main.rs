//! Upstage installer entry point

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, error, info};
use upstage_installer::install::load_resources;
use upstage_installer::logging::{init_logging, log_filter, open_log_file};
use upstage_installer::{Cli, ConsoleRenderer, ExitCode, Installer};
use upstage_resources::platform_store;
use upstage_updater::UpdateError;

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    if cli.is_uninstall() {
        eprintln!("Uninstall is not supported by this installer");
        return ExitCode::Unsupported.to_exit_code();
    }

    let installer = match prepare(&cli) {
        Ok(installer) => installer,
        Err(e) => {
            let _ = init_logging(log_filter(cli.verbose, cli.debug, "warn"), None);
            error!("Installer start failed: {:#}", e);
            eprintln!("Error: {e:#}");
            return exit_code(&e).to_exit_code();
        }
    };

    let config = installer.config();
    let log_path = config.layout().log_path();
    let log_file = match open_log_file(&log_path) {
        Ok(file) => Some(file),
        Err(e) => {
            eprintln!("Warning: cannot write {}: {e}", log_path.display());
            None
        }
    };
    if let Err(e) = init_logging(log_filter(cli.verbose, cli.debug, &config.logging.level), log_file) {
        eprintln!("Warning: logging disabled: {e}");
    }
    info!("Installer {} started", config.package_id);

    let mut renderer = ConsoleRenderer::stdout();
    if cli.quiet {
        renderer = renderer.quiet();
    }

    let result = installer
        .run(|event| {
            if let Err(e) = renderer.render(event) {
                debug!("Console output failed: {}", e);
            }
        })
        .await;

    match result {
        Ok(outcome) => {
            let code = ExitCode::from_outcome(&outcome);
            info!("Installer finished: {}", code.name());
            code.to_exit_code()
        }
        Err(e) => {
            error!("Install failed: {}", e);
            eprintln!("Error: {e}");
            ExitCode::from_error(&e).to_exit_code()
        }
    }
}

/// Read our own resources and build the installer.
fn prepare(cli: &Cli) -> anyhow::Result<Installer> {
    let executable: PathBuf = match &cli.installer {
        Some(path) => path.clone(),
        None => std::env::current_exe().context("cannot locate the running executable")?,
    };

    let store = platform_store();
    let resources = load_resources(store.as_ref(), &executable)
        .with_context(|| format!("cannot read resources of {}", executable.display()))?;
    let installer = Installer::from_resources(resources, &executable, &cli.install_options())?;
    Ok(installer)
}

fn exit_code(error: &anyhow::Error) -> ExitCode {
    error
        .downcast_ref::<UpdateError>()
        .map(ExitCode::from_error)
        .unwrap_or(ExitCode::GeneralError)
}
