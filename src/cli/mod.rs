// CLI - Command Line Interface for KratOs Devnet
// Principle: Simple, clear, composable commands

pub mod runner;

use crate::config::{ConfigError, DevnetConfig};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// KratOs Devnet - Local multi-node test networks
#[derive(Parser, Debug)]
#[command(name = "kratos-devnet")]
#[command(author = "KratOs Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Spin up and tear down local KratOs test networks")]
#[command(long_about = r#"
Launches a set of embedded KratOs dev nodes on the loopback interface,
wires them into a full mesh and keeps them running until Ctrl+C.

Start a four node network with one block producer:
  kratos-devnet up --nodes 4

Start with authenticated control endpoints:
  kratos-devnet up --nodes 3 --control

Mint a bearer token for a control endpoint:
  kratos-devnet secret token --secret <base>/node-0/secret.hex
"#)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true, default_value = "false")]
    pub verbose: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info", env = "KRATOS_LOG")]
    pub log_level: String,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a devnet and run it until Ctrl+C
    Up(UpCmd),

    /// Control channel secrets
    Secret(SecretCmd),
}

/// Start a devnet
#[derive(Parser, Debug)]
pub struct UpCmd {
    /// Number of nodes
    #[arg(short = 'n', long, default_value = "3")]
    pub nodes: usize,

    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Base path for node data
    #[arg(short = 'd', long, env = "KRATOS_BASE_PATH")]
    pub base_path: Option<PathBuf>,

    /// Chain name reported by the nodes
    #[arg(long)]
    pub chain: Option<String>,

    /// Provision secrets and authenticated control endpoints
    #[arg(long)]
    pub control: bool,

    /// Block producing node index (can be specified multiple times)
    #[arg(long = "producer", value_name = "INDEX")]
    pub producers: Vec<usize>,

    /// Interval between blocks in milliseconds
    #[arg(long)]
    pub block_time_ms: Option<u64>,

    /// Remove the base path after shutdown
    #[arg(long)]
    pub purge: bool,
}

impl UpCmd {
    /// Configuration file (or defaults) with command line overrides applied
    pub fn to_config(&self) -> Result<DevnetConfig, ConfigError> {
        let mut config = match self.config {
            Some(ref path) => DevnetConfig::load(path)?,
            None => DevnetConfig::default(),
        };

        if let Some(ref base_path) = self.base_path {
            config = config.with_base_dir(base_path);
        }
        if let Some(ref chain) = self.chain {
            config = config.with_chain_name(chain);
        }
        if self.control {
            config = config.with_control(true);
        }
        if !self.producers.is_empty() {
            config = config.with_producers(self.producers.clone());
        }
        if let Some(ms) = self.block_time_ms {
            config = config.with_block_time_ms(ms);
        }

        Ok(config)
    }
}

/// Secret management commands
#[derive(Parser, Debug)]
pub struct SecretCmd {
    #[command(subcommand)]
    pub subcommand: SecretSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum SecretSubcommand {
    /// Write a fresh secret.hex into a directory
    Generate {
        /// Target directory (created if missing)
        #[arg(long)]
        dir: PathBuf,
    },

    /// Print a bearer token for a secret file
    Token {
        /// Path to secret.hex
        #[arg(long)]
        secret: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_cli_parse_up() {
        let cli = Cli::try_parse_from(["kratos-devnet", "up"]).unwrap();
        match cli.command {
            Commands::Up(cmd) => {
                assert_eq!(cmd.nodes, 3);
                assert!(!cmd.control);
                assert!(cmd.producers.is_empty());
            }
            _ => panic!("Expected Up command"),
        }
    }

    #[test]
    fn test_cli_parse_up_with_options() {
        let cli = Cli::try_parse_from([
            "kratos-devnet",
            "up",
            "--nodes",
            "5",
            "--control",
            "--producer",
            "0",
            "--producer",
            "3",
            "--block-time-ms",
            "250",
            "-d",
            "/tmp/devnet",
        ])
        .unwrap();

        match cli.command {
            Commands::Up(cmd) => {
                assert_eq!(cmd.nodes, 5);
                assert_eq!(cmd.producers, vec![0, 3]);

                let config = cmd.to_config().unwrap();
                assert!(config.enable_control);
                assert_eq!(config.producers, vec![0, 3]);
                assert_eq!(config.block_time_ms, 250);
                assert_eq!(config.base_dir, PathBuf::from("/tmp/devnet"));
            }
            _ => panic!("Expected Up command"),
        }
    }

    #[test]
    fn test_cli_flags_override_config_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("devnet.toml");
        DevnetConfig::default()
            .with_chain_name("from-file")
            .with_block_time_ms(2_000)
            .save(&path)
            .unwrap();

        let cli = Cli::try_parse_from([
            "kratos-devnet",
            "up",
            "--config",
            path.to_str().unwrap(),
            "--block-time-ms",
            "100",
        ])
        .unwrap();

        match cli.command {
            Commands::Up(cmd) => {
                let config = cmd.to_config().unwrap();
                assert_eq!(config.chain_name, "from-file");
                assert_eq!(config.block_time_ms, 100);
            }
            _ => panic!("Expected Up command"),
        }
    }

    #[test]
    fn test_cli_parse_secret_commands() {
        let cli = Cli::try_parse_from(["kratos-devnet", "secret", "generate", "--dir", "/tmp/s"])
            .unwrap();
        match cli.command {
            Commands::Secret(SecretCmd {
                subcommand: SecretSubcommand::Generate { dir },
            }) => assert_eq!(dir, PathBuf::from("/tmp/s")),
            _ => panic!("Expected Secret Generate command"),
        }

        let cli = Cli::try_parse_from([
            "kratos-devnet",
            "--verbose",
            "secret",
            "token",
            "--secret",
            "/tmp/s/secret.hex",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Commands::Secret(SecretCmd {
                subcommand: SecretSubcommand::Token { .. }
            })
        ));
    }
}
