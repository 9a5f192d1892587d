// apogee_sim/src/cli.rs

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "apogee")]
#[command(about = "Rocket flight state estimation: simulate, filter and tune")]
#[command(version)]
pub struct Cli {
    /// Log at debug level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(about = "generate a synthetic flight and write it as a flight log")]
    Simulate {
        #[arg(short, long, default_value = "apogee.toml")]
        config: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        /// Overrides `[simulation] seed`
        #[arg(long)]
        seed: Option<u64>,
    },

    #[command(about = "run the configured filter over a flight log")]
    Estimate {
        #[arg(short, long, default_value = "apogee.toml")]
        config: PathBuf,

        #[arg(short, long)]
        input: PathBuf,

        /// Covariances written by `tune`
        #[arg(short, long)]
        tuned: Option<PathBuf>,

        /// CSV of estimates; only the summary is logged when absent
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    #[command(about = "search filter covariances over real and synthetic flights")]
    Tune {
        #[arg(short, long, default_value = "apogee.toml")]
        config: PathBuf,

        #[arg(short, long, default_value = "tuned.toml")]
        output: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_each_command() {
        let cli = Cli::parse_from(["apogee", "simulate", "--output", "flight.csv", "--seed", "3"]);
        assert!(matches!(
            cli.command,
            Command::Simulate { seed: Some(3), .. }
        ));
        assert!(!cli.verbose);

        let cli = Cli::parse_from(["apogee", "estimate", "-i", "log.csv", "--tuned", "tuned.toml", "-v"]);
        assert!(cli.verbose);
        match cli.command {
            Command::Estimate { config, tuned, output, .. } => {
                assert_eq!(config, PathBuf::from("apogee.toml"));
                assert_eq!(tuned, Some(PathBuf::from("tuned.toml")));
                assert!(output.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }

        let cli = Cli::parse_from(["apogee", "tune", "-c", "custom.toml"]);
        assert!(matches!(cli.command, Command::Tune { .. }));
    }

    #[test]
    fn test_simulate_requires_output() {
        assert!(Cli::try_parse_from(["apogee", "simulate"]).is_err());
    }
}
