// KratOs Devnet - Entry point

use clap::Parser;
use kratos_devnet::cli::runner::{generate_secret_file, run_devnet, token_for_secret};
use kratos_devnet::cli::{Cli, Commands, SecretSubcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_filter = if cli.verbose {
        "debug"
    } else {
        &cli.log_level
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(log_filter)),
        )
        .init();

    match cli.command {
        Commands::Up(cmd) => {
            print_banner();

            if let Err(e) = run_devnet(&cmd).await {
                error!("Devnet error: {}", e);
                return Err(anyhow::anyhow!("Devnet error: {}", e));
            }
        }

        Commands::Secret(cmd) => match cmd.subcommand {
            SecretSubcommand::Generate { dir } => {
                let path = generate_secret_file(&dir)?;
                println!("{}", path.display());
            }
            SecretSubcommand::Token { secret } => {
                println!("{}", token_for_secret(&secret)?);
            }
        },
    }

    info!("Goodbye!");
    Ok(())
}

/// Print the devnet banner
fn print_banner() {
    println!(r#"
    ╔═══════════════════════════════════════════════════════════╗
    ║                                                           ║
    ║   ██╗  ██╗██████╗  █████╗ ████████╗ ██████╗ ███████╗     ║
    ║   ██║ ██╔╝██╔══██╗██╔══██╗╚══██╔══╝██╔═══██╗██╔════╝     ║
    ║   █████╔╝ ██████╔╝███████║   ██║   ██║   ██║███████╗     ║
    ║   ██╔═██╗ ██╔══██╗██╔══██║   ██║   ██║   ██║╚════██║     ║
    ║   ██║  ██╗██║  ██║██║  ██║   ██║   ╚██████╔╝███████║     ║
    ║   ╚═╝  ╚═╝╚═╝  ╚═╝╚═╝  ╚═╝   ╚═╝    ╚═════╝ ╚══════╝     ║
    ║                                                           ║
    ║                    Local Test Networks                    ║
    ║                                                           ║
    ╚═══════════════════════════════════════════════════════════╝
    "#);
    println!("    Version: {}", env!("CARGO_PKG_VERSION"));
    println!();
}
