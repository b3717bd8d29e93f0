use clap::Parser;
use deployer_core::DeployerSettings;
use log::debug;
use std::process::ExitCode;

pub mod args;
pub mod commands;
pub mod error;

use args::Cli;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let settings = match DeployerSettings::load(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: failed to load settings: {e}");
            return ExitCode::FAILURE;
        }
    };
    debug!("Portable tools under {}", settings.portable_root().display());

    match commands::dispatch(cli.command, &settings) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // Always shown, whatever RUST_LOG says.
            eprintln!("Error: {e}");
            debug!("{e:?}");
            ExitCode::FAILURE
        }
    }
}
