// Runner - Devnet execution logic
// Principle: Start the network, print how to reach it, tear it down on Ctrl+C

use crate::cli::UpCmd;
use crate::config::ConfigError;
use crate::devnet::identity::NodeIdentity;
use crate::devnet::manager::{Manager, ManagerError};
use crate::devnet::secret::{generate_secret, read_secret, SecretError};
use crate::node::service::DevEngine;
use crate::rpc::auth::{create_token, AuthError};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Run a devnet until Ctrl+C
pub async fn run_devnet(cmd: &UpCmd) -> Result<(), RunnerError> {
    let config = cmd.to_config()?;
    let base_dir = config.base_dir.clone();

    info!("🚀 Starting KratOs devnet with {} node(s)", cmd.nodes);
    info!("📁 Data path: {}", base_dir.display());
    info!("⛓️  Chain: {}", config.chain_name);

    std::fs::create_dir_all(&base_dir)
        .map_err(|e| RunnerError::Io(format!("Failed to create data dir: {}", e)))?;

    let shutdown = CancellationToken::new();

    // Ctrl+C also aborts a start in progress
    let signal_token = shutdown.clone();
    let signal_task = tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => info!("⚠️  Ctrl+C received, shutting down..."),
            Err(e) => warn!("Failed to listen for Ctrl+C: {}", e),
        }
        signal_token.cancel();
    });

    let mut manager = Manager::new(DevEngine::from_config(&config), config);
    let result = manager.start(&shutdown, cmd.nodes).await;

    if result.is_ok() {
        println!("{}", format_node_table(manager.identities()));
        info!("✅ Devnet running, press Ctrl+C to stop");

        shutdown.cancelled().await;
        manager.wait().await;
    }

    signal_task.abort();

    if cmd.purge {
        purge(&base_dir);
    }

    result.map_err(RunnerError::from)
}

fn purge(base_dir: &Path) {
    match std::fs::remove_dir_all(base_dir) {
        Ok(()) => info!("🗑️  Purged {}", base_dir.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to purge {}: {}", base_dir.display(), e),
    }
}

/// One line per node: index, role, endpoints, peer ID
pub fn format_node_table(identities: &[NodeIdentity]) -> String {
    let mut table = String::new();
    let _ = writeln!(
        table,
        "{:<5} {:<9} {:<22} {:<22} {:<22} PEER ID",
        "NODE", "ROLE", "P2P", "RPC", "CONTROL"
    );

    for identity in identities {
        let role = if identity.is_producer { "producer" } else { "follower" };
        let control = identity
            .control_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| "-".to_string());

        let _ = writeln!(
            table,
            "{:<5} {:<9} {:<22} {:<22} {:<22} {}",
            identity.index,
            role,
            format!("127.0.0.1:{}", identity.p2p_port),
            identity.rpc_addr(),
            control,
            identity.id
        );
    }

    table
}

/// Provision a secret file in `dir`
pub fn generate_secret_file(dir: &Path) -> Result<PathBuf, RunnerError> {
    let path = generate_secret(dir)?;
    info!("🔑 Secret written to {}", path.display());
    Ok(path)
}

/// Bearer token for the secret stored at `path`
pub fn token_for_secret(path: &Path) -> Result<String, RunnerError> {
    let secret = read_secret(path)?;
    Ok(create_token(&secret)?)
}

/// Runner errors
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Devnet error: {0}")]
    Manager(#[from] ManagerError),

    #[error("Secret error: {0}")]
    Secret(#[from] SecretError),

    #[error("Token error: {0}")]
    Auth(#[from] AuthError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devnet::identity::{generate_identities, IdentityOptions};
    use crate::rpc::auth::verify_token;
    use tempfile::tempdir;

    #[test]
    fn test_node_table_lists_every_node() {
        let dir = tempdir().unwrap();
        let options = IdentityOptions {
            enable_control: true,
            producers: vec![0],
        };
        let identities = generate_identities(dir.path(), 2, &options).unwrap();

        let table = format_node_table(&identities);
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[1].contains("producer"));
        assert!(lines[2].contains("follower"));
        assert!(lines[2].contains(&identities[1].id.to_string()));
        assert!(lines[1].contains(&identities[0].rpc_addr().to_string()));
    }

    #[test]
    fn test_secret_and_token_commands() {
        let dir = tempdir().unwrap();
        let path = generate_secret_file(&dir.path().join("keys")).unwrap();

        let token = token_for_secret(&path).unwrap();
        let secret = read_secret(&path).unwrap();
        verify_token(&token, &secret).unwrap();
    }

    #[test]
    fn test_token_for_missing_secret_fails() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            token_for_secret(&dir.path().join("secret.hex")),
            Err(RunnerError::Secret(_))
        ));
    }
}
