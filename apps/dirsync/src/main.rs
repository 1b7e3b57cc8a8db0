//! dirsync - scheduled reconciliation of a secondary directory against a primary one
//!
//! Two run modes:
//! - `group_sync` mirrors flattened primary group membership
//! - `user_sync` creates, enables, disables and updates secondary accounts
//!
//! The exit code only reports fatal errors. Whether the run as a whole
//! succeeded is written to the run-status file for monitoring.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

mod config;
mod error;
mod logging;
mod run;

use dirsync_engine::{RunOptions, SyncMode};
use error::CliResult;

/// dirsync - directory reconciliation
#[derive(Debug, Parser)]
#[command(name = "dirsync")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Mirror flattened primary group membership onto the secondary directory
    #[command(name = "group_sync")]
    GroupSync(GroupSyncArgs),

    /// Create, enable, disable and update secondary user accounts
    #[command(name = "user_sync")]
    UserSync(UserSyncArgs),
}

/// Arguments shared by every run mode.
#[derive(Debug, Args)]
pub struct CommonArgs {
    /// Run configuration file
    #[arg(long = "config_file", default_value = "config/config.yaml")]
    pub config_file: PathBuf,

    /// Console log level
    #[arg(long = "console_log_level", value_enum, default_value_t = ConsoleLevel::Info)]
    pub console_log_level: ConsoleLevel,

    /// `noop` only logs writes, `prod` applies and audits them
    #[arg(long = "environment", value_enum, default_value_t = Environment::Noop)]
    pub environment: Environment,
}

#[derive(Debug, Args)]
pub struct GroupSyncArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Apply every group regardless of the change thresholds
    #[arg(long = "universal_override")]
    pub universal_override: bool,

    /// Apply the named groups regardless of the change thresholds
    #[arg(long = "group_override", num_args = 1.., value_name = "NAME")]
    pub group_override: Vec<String>,
}

#[derive(Debug, Args)]
pub struct UserSyncArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

/// Console verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConsoleLevel {
    Error,
    Warning,
    Info,
    Debug,
}

impl ConsoleLevel {
    /// Level name understood by `EnvFilter`.
    pub fn directive(self) -> &'static str {
        match self {
            ConsoleLevel::Error => "error",
            ConsoleLevel::Warning => "warn",
            ConsoleLevel::Info => "info",
            ConsoleLevel::Debug => "debug",
        }
    }
}

/// Where writes go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Environment {
    /// Searches are live, writes are logged and skipped.
    Noop,
    /// Writes are applied and recorded in the audit manifest.
    Prod,
}

impl Environment {
    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Noop => "noop",
            Environment::Prod => "prod",
        }
    }
}

impl Commands {
    fn mode(&self) -> SyncMode {
        match self {
            Commands::GroupSync(_) => SyncMode::GroupSync,
            Commands::UserSync(_) => SyncMode::UserSync,
        }
    }

    fn common(&self) -> &CommonArgs {
        match self {
            Commands::GroupSync(args) => &args.common,
            Commands::UserSync(args) => &args.common,
        }
    }

    fn options(&self) -> RunOptions {
        match self {
            Commands::GroupSync(args) => RunOptions::new()
                .with_universal_override(args.universal_override)
                .with_group_override(&args.group_override),
            Commands::UserSync(_) => RunOptions::new(),
        }
    }
}

fn main() {
    let cli = Cli::parse();

    match execute(cli) {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            e.print();
            std::process::exit(e.exit_code());
        }
    }
}

fn execute(cli: Cli) -> CliResult<()> {
    let mode = cli.command.mode();
    let options = cli.command.options();
    run::execute(mode, cli.command.common(), options)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("dirsync").chain(args.iter().copied()))
            .expect("arguments parse")
    }

    // --- defaults ---

    #[test]
    fn test_group_sync_defaults() {
        let cli = parse(&["group_sync"]);

        assert_eq!(cli.command.mode(), SyncMode::GroupSync);
        let common = cli.command.common();
        assert_eq!(common.config_file, PathBuf::from("config/config.yaml"));
        assert_eq!(common.console_log_level, ConsoleLevel::Info);
        assert_eq!(common.environment, Environment::Noop);
        assert_eq!(cli.command.options(), RunOptions::new());
    }

    #[test]
    fn test_user_sync_flags() {
        let cli = parse(&[
            "user_sync",
            "--config_file",
            "/etc/dirsync.yaml",
            "--console_log_level",
            "warning",
            "--environment",
            "prod",
        ]);

        assert_eq!(cli.command.mode(), SyncMode::UserSync);
        let common = cli.command.common();
        assert_eq!(common.config_file, PathBuf::from("/etc/dirsync.yaml"));
        assert_eq!(common.console_log_level.directive(), "warn");
        assert_eq!(common.environment.as_str(), "prod");
    }

    // --- overrides ---

    #[test]
    fn test_group_overrides() {
        let cli = parse(&[
            "group_sync",
            "--universal_override",
            "--group_override",
            "Admins",
            "web",
        ]);

        let options = cli.command.options();
        assert!(options.universal_override);
        assert!(options.is_group_overridden("admins"));
        assert!(options.is_group_overridden("WEB"));
    }

    #[test]
    fn test_user_sync_rejects_overrides() {
        let result = Cli::try_parse_from(["dirsync", "user_sync", "--universal_override"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_environment_is_rejected() {
        let result = Cli::try_parse_from(["dirsync", "group_sync", "--environment", "staging"]);
        assert!(result.is_err());
    }
}
