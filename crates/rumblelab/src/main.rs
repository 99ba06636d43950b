mod app;
mod backends;
mod cli;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;
use crossbeam_channel::bounded;
use rumblelab::{logging, print_debug, print_error};
use rumblelab_session::SessionConfig;

use crate::backends::Backends;
use crate::cli::{Cli, Command};

const DEFAULT_CONFIG: &str = "rumblelab.yaml";

fn load_config(path: Option<&Path>) -> Result<SessionConfig, String> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => {
            let path = PathBuf::from(DEFAULT_CONFIG);
            if !path.exists() {
                return Ok(SessionConfig::default());
            }
            path
        }
    };
    print_debug!("loading config from {}", path.display());
    SessionConfig::load(&path).map_err(|e| format!("{}: {e}", path.display()))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::setup(cli.verbose, cli.no_color);

    let (stop_tx, stop_rx) = bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(());
    })
    .expect("failed to set Ctrl+C handler");

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            print_error!("invalid config: {e}");
            return ExitCode::FAILURE;
        }
    };

    let backends = match Backends::open(cli.mock) {
        Ok(backends) => backends,
        Err(e) => {
            print_error!("failed to open controller backend: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Command::List => app::list(&backends, config),
        Command::Test { device, effect } => app::test(&backends, config, device, effect, &stop_rx),
        Command::Slots { feedback } => app::slots(&backends, config, &feedback, &stop_rx),
    };

    if let Err(e) = result {
        print_error!("{e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
