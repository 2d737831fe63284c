//! Command-line interface.
//!
//! One binary covers four run modes: daemon, foreground, direct command
//! execution, and client (send a command to a running daemon). `--help`
//! is handled manually because it both prints local usage and asks the
//! daemon for its command listing, which depends on the configured
//! modules. `-?` is accepted as an alias for `--help`.

use std::path::PathBuf;

use clap::{ArgAction, Parser};

#[derive(Parser, Debug)]
#[command(
    name = "picod",
    version,
    about = "System controller daemon for NAS PIC devices",
    disable_help_flag = true
)]
pub struct Cli {
    /// Run as a background daemon
    #[arg(short = 'd', long)]
    pub daemon: bool,

    /// Run in the foreground, logging to stderr
    #[arg(short = 'f', long)]
    pub foreground: bool,

    /// Path to the configuration file
    #[arg(short = 'c', long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Execute a single command against the hardware and exit
    #[arg(long)]
    pub direct: bool,

    /// Print usage and the command listing of the running daemon
    #[arg(long = "help", action = ArgAction::SetTrue)]
    pub help: bool,

    /// Command and arguments
    #[arg(trailing_var_arg = true)]
    pub command: Vec<String>,
}

/// How the process should run, resolved from the flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Daemon,
    Foreground,
    Direct,
    Client,
    Help,
}

impl Cli {
    pub fn mode(&self) -> Mode {
        if self.help {
            Mode::Help
        } else if self.daemon {
            Mode::Daemon
        } else if self.foreground {
            Mode::Foreground
        } else if self.direct {
            Mode::Direct
        } else if !self.command.is_empty() {
            Mode::Client
        } else {
            Mode::Help
        }
    }
}

pub fn usage() -> String {
    format!(
        "Usage: {} [OPTION...] [command] [args...]\n\
         \x20 -c, --config FILE          Specify configuration file\n\
         \x20 -d, --daemon               Run as a background daemon\n\
         \x20 -f, --foreground           Run in the foreground\n\
         \x20     --direct               Execute a single command directly\n\
         \x20 -?, --help                 Give this help list\n\
         \x20 -V, --version              Print program version\n",
        env!("CARGO_PKG_NAME")
    )
}

/// Parse the process arguments. clap does not accept `-?` as a flag
/// name, so it is rewritten to `--help` up front.
pub fn parse() -> Cli {
    let args = std::env::args().map(|arg| {
        if arg == "-?" {
            "--help".to_string()
        } else {
            arg
        }
    });
    Cli::parse_from(args)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_args(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("picod").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_daemon_mode() {
        assert_eq!(parse_args(&["-d"]).mode(), Mode::Daemon);
        assert_eq!(parse_args(&["--daemon"]).mode(), Mode::Daemon);
    }

    #[test]
    fn test_foreground_mode() {
        assert_eq!(parse_args(&["-f"]).mode(), Mode::Foreground);
    }

    #[test]
    fn test_client_mode_with_command() {
        let cli = parse_args(&["fanspeed", "high"]);
        assert_eq!(cli.mode(), Mode::Client);
        assert_eq!(cli.command, vec!["fanspeed", "high"]);
    }

    #[test]
    fn test_direct_mode() {
        let cli = parse_args(&["--direct", "buzzer", "short"]);
        assert_eq!(cli.mode(), Mode::Direct);
        assert_eq!(cli.command, vec!["buzzer", "short"]);
    }

    #[test]
    fn test_no_args_prints_help() {
        assert_eq!(parse_args(&[]).mode(), Mode::Help);
    }

    #[test]
    fn test_help_flag_wins() {
        let cli = parse_args(&["--help", "fanspeed"]);
        assert_eq!(cli.mode(), Mode::Help);
    }

    #[test]
    fn test_config_path() {
        let cli = parse_args(&["-c", "/etc/other.yaml", "-f"]);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/other.yaml")));
        assert_eq!(cli.mode(), Mode::Foreground);
    }

    #[test]
    fn test_usage_names_all_modes() {
        let text = usage();
        assert!(text.contains("--daemon"));
        assert!(text.contains("--foreground"));
        assert!(text.contains("--direct"));
        assert!(text.contains("-?"));
    }
}
