mod run;
mod shared;
mod watch;

use crate::VERSION;
use crate::config::PidtraceConfig;
use crate::prelude::*;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "pidtrace")]
#[command(version, about = "Trace process starts and exits")]
pub struct Cli {
    /// Path to the configuration file (pidtrace.yaml)
    /// If not provided, looks for pidtrace.yaml in the current directory
    #[arg(long, env = "PIDTRACE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a command and trace it along with its descendants
    #[command(alias = "r")]
    Run(run::RunArgs),
    /// Trace every process of the system
    #[command(alias = "w")]
    Watch(watch::WatchArgs),
}

/// Run the CLI and return the exit code of the process
pub fn run() -> Result<i32> {
    let cli = Cli::parse();
    debug!("pidtrace v{VERSION}");

    let config = PidtraceConfig::load(cli.config.as_deref(), &std::env::current_dir()?)?;
    debug!("Using configuration: {config:?}");

    match cli.command {
        Commands::Run(args) => run::run(args, &config),
        Commands::Watch(args) => watch::run(args, &config),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_takes_trailing_command() {
        let cli = Cli::try_parse_from(["pidtrace", "run", "-o", "out", "--", "sh", "-c", "true"])
            .unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("Expected the run command");
        };
        assert_eq!(args.output, PathBuf::from("out"));
        assert_eq!(args.command, vec!["sh", "-c", "true"]);
    }

    #[test]
    fn test_run_requires_a_command() {
        assert!(Cli::try_parse_from(["pidtrace", "run"]).is_err());
    }

    #[test]
    fn test_watch_options() {
        let cli = Cli::try_parse_from([
            "pidtrace",
            "--config",
            "custom.yaml",
            "watch",
            "--duration",
            "5",
            "--pid",
            "42",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("custom.yaml")));
        let Commands::Watch(args) = cli.command else {
            panic!("Expected the watch command");
        };
        assert_eq!(args.duration, Some(5));
        assert_eq!(args.pid, Some(42));
        assert_eq!(args.events, None);
    }
}
