//! Paramsync CLI
//!
//! Command-line interface for running and inspecting parameter sync sessions.

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use log::info;

use paramsync::cli::{commands, Cli, Commands};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    info!("Paramsync v{}", env!("CARGO_PKG_VERSION"));

    let config = commands::load_config(cli.config.as_deref()).with_context(|| {
        format!(
            "cannot load configuration from {}",
            cli.config.as_deref().map(|p| p.display().to_string()).unwrap_or_default()
        )
    })?;

    match cli.command {
        Commands::Editor {
            port,
            fps,
            edits,
            duration,
        } => {
            let config = match port {
                Some(port) => config.with_port(port),
                None => config,
            };
            commands::run_editor(config, fps, &edits, duration.map(Duration::from_secs))
                .context("editor session failed")?;
        }
        Commands::Host {
            port,
            dir,
            params,
            fps,
            duration,
        } => {
            let mut config = config;
            if let Some(port) = port {
                config = config.with_port(port);
            }
            if let Some(dir) = dir {
                config = config.with_local_dir(dir);
            }
            commands::run_host(config, fps, &params, duration.map(Duration::from_secs))
                .context("host session failed")?;
        }
        Commands::Inspect { dir } => commands::inspect(&dir)
            .with_context(|| format!("cannot inspect {}", dir.display()))?,
        Commands::Reset { dir, all } => commands::reset(&dir, all)
            .with_context(|| format!("cannot reset {}", dir.display()))?,
    }

    Ok(())
}
