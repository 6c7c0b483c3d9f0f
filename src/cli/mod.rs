//! CLI Module
//!
//! Command-line interface for running either side of a session headless and
//! for inspecting or repairing a parameter directory.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::color::Color;

/// Paramsync - live color parameter synchronization
#[derive(Parser, Debug)]
#[command(name = "paramsync")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// JSON configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a headless editor that prints parameters received from the host
    #[command(name = "editor")]
    Editor {
        /// Rendezvous port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Ticks per second
        #[arg(long, default_value_t = 60)]
        fps: u32,

        /// Edit to push once running, as name=#rrggbb (repeatable)
        #[arg(long = "set", value_parser = parse_assignment)]
        edits: Vec<(String, Color)>,

        /// Stop after this many seconds
        #[arg(long)]
        duration: Option<u64>,
    },

    /// Run a demo host that registers parameters and prints editor changes
    #[command(name = "host")]
    Host {
        /// Editor's rendezvous port
        #[arg(short, long)]
        port: Option<u16>,

        /// Host parameter directory
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Parameter name to register (repeatable)
        #[arg(long = "param")]
        params: Vec<String>,

        /// Ticks per second
        #[arg(long, default_value_t = 60)]
        fps: u32,

        /// Stop after this many seconds
        #[arg(long)]
        duration: Option<u64>,
    },

    /// Show version marker, snapshot and mailbox state of a directory
    #[command(name = "inspect")]
    Inspect {
        /// Parameter directory
        dir: PathBuf,
    },

    /// Clear both mailbox slots of a directory
    #[command(name = "reset")]
    Reset {
        /// Parameter directory
        dir: PathBuf,

        /// Also remove the version marker and snapshot
        #[arg(long)]
        all: bool,
    },
}

/// Parse `name=#rrggbb[aa]`.
pub fn parse_assignment(s: &str) -> Result<(String, Color), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected name=#rrggbb, got '{}'", s))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing parameter name in '{}'", s));
    }
    let color = value.parse::<Color>().map_err(|e| e.to_string())?;
    Ok((name.to_string(), color))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use test_case::test_case;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test_case("primary=#ff0000", "primary", Color::rgb(255, 0, 0) ; "hex")]
    #[test_case(" glow =00ff0080", "glow", Color::rgba(0, 255, 0, 128) ; "alpha and spaces")]
    fn test_parse_assignment(input: &str, name: &str, color: Color) {
        assert_eq!(parse_assignment(input).unwrap(), (name.to_string(), color));
    }

    #[test_case("primary" ; "no equals")]
    #[test_case("=#ff0000" ; "no name")]
    #[test_case("primary=red" ; "bad color")]
    fn test_parse_assignment_rejects(input: &str) {
        assert!(parse_assignment(input).is_err());
    }

    #[test]
    fn test_parse_editor_command() {
        let cli = Cli::try_parse_from([
            "paramsync",
            "-v",
            "editor",
            "--port",
            "4000",
            "--set",
            "primary=#010203",
        ])
        .unwrap();

        assert!(cli.verbose);
        match cli.command {
            Commands::Editor { port, fps, edits, .. } => {
                assert_eq!(port, Some(4000));
                assert_eq!(fps, 60);
                assert_eq!(edits, vec![("primary".to_string(), Color::rgb(1, 2, 3))]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
