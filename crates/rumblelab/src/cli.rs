use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;

#[derive(Debug, Subcommand, PartialEq)]
pub(crate) enum Command {
    /// List controllers with their capabilities and effects.
    List,
    /// Test one controller: play the selected effect while a button is held.
    Test {
        /// Index of the device to select
        #[clap(short, long)]
        device: Option<usize>,
        /// Index of the effect to select
        #[clap(short, long)]
        effect: Option<usize>,
    },
    /// Watch gamepad slots and rumble them from their sticks.
    Slots {
        /// Slots to start with feedback enabled
        #[clap(short, long)]
        feedback: Vec<usize>,
    },
}

/// Interactive controller input and force-feedback tester.
#[derive(Parser)]
#[command(version, about, long_about = None)]
pub(crate) struct Cli {
    /// Turn debugging information on
    #[arg(short, long)]
    pub(crate) verbose: bool,

    /// Disable colored output
    #[arg(long)]
    pub(crate) no_color: bool,

    /// Session config file (defaults to ./rumblelab.yaml when present)
    #[arg(short, long)]
    pub(crate) config: Option<PathBuf>,

    /// Use simulated controllers instead of SDL
    #[arg(long)]
    pub(crate) mock: bool,

    /// The command to run
    #[clap(subcommand)]
    pub(crate) command: Command,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_test_with_selection() {
        let cli = Cli::parse_from(["rumblelab", "--mock", "test", "-d", "1", "--effect", "2"]);
        assert!(cli.mock);
        assert_eq!(
            cli.command,
            Command::Test {
                device: Some(1),
                effect: Some(2)
            }
        );
    }

    #[test]
    fn parses_repeated_feedback_slots() {
        let cli = Cli::parse_from(["rumblelab", "-v", "slots", "-f", "0", "-f", "2"]);
        assert!(cli.verbose);
        assert_eq!(
            cli.command,
            Command::Slots {
                feedback: vec![0, 2]
            }
        );
    }
}
