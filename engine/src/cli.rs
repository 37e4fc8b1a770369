//! CLI interface for Sophie
//!
//! Defines the command-line surface using clap's derive API. Mode and wake
//! word are fixed for the life of the process.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Mode;

/// Sophie conversational command assistant
///
/// Listens for typed or spoken commands, answers each with one reply, and
/// remembers the conversations it had with the language model.
#[derive(Parser, Debug)]
#[command(name = "sophie")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Interaction mode
    #[arg(long, global = true, value_enum)]
    pub mode: Option<Mode>,

    /// Wake word for voice mode
    #[arg(long, global = true, value_name = "WORD")]
    pub wake: Option<String>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Runs the interactive session when omitted
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Answer a single input and exit
    Run {
        /// The input to answer
        #[arg(required = true, num_args = 1..)]
        input: Vec<String>,
    },

    /// Show remembered conversations
    History {
        /// Number of exchanges to show (default: 10)
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Report which collaborators are configured
    Doctor,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_structure() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_no_command_runs_session() {
        let cli = Cli::parse_from(["sophie"]);
        assert!(cli.command.is_none());
        assert!(cli.mode.is_none());
        assert!(!cli.json);
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::parse_from([
            "sophie", "--mode", "voice", "--wake", "Jarvis", "--log", "debug",
        ]);
        assert_eq!(cli.mode, Some(Mode::Voice));
        assert_eq!(cli.wake.as_deref(), Some("Jarvis"));
        assert_eq!(cli.log.as_deref(), Some("debug"));
    }

    #[test]
    fn test_run_command() {
        let cli = Cli::parse_from(["sophie", "run", "what", "time", "is", "it"]);
        if let Some(Command::Run { input }) = cli.command {
            assert_eq!(input.join(" "), "what time is it");
        } else {
            panic!("Expected Run command");
        }
    }

    #[test]
    fn test_history_command() {
        let cli = Cli::parse_from(["sophie", "history", "--limit", "20"]);
        if let Some(Command::History { limit }) = cli.command {
            assert_eq!(limit, 20);
        } else {
            panic!("Expected History command");
        }

        let cli = Cli::parse_from(["sophie", "--json", "history"]);
        assert!(cli.json);
        assert!(matches!(cli.command, Some(Command::History { limit: 10 })));
    }

    #[test]
    fn test_invalid_mode_rejected() {
        assert!(Cli::try_parse_from(["sophie", "--mode", "telepathy"]).is_err());
    }
}
