// Manager - Orchestrates the lifecycle of a local devnet
// Principle: Either every node is up and wired, or none is left running
//
// Lifecycle:
//   Idle → Starting → Running → Stopping → Stopped
//              ↓
//            Failed (every launched node already closed)

use super::engine::{Engine, EngineError, NodeHandle};
use super::identity::{generate_identities, IdentityOptions, NodeIdentity};
use super::ports::AllocationError;
use super::readiness::{wait_until_ready, ReadinessError};
use super::secret::{generate_secret, SecretError};
use super::topology::{build_peer_lists, connection_count};
use crate::config::DevnetConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Lifecycle state of a devnet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Idle,
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl std::fmt::Display for ManagerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ManagerState::Idle => "idle",
            ManagerState::Starting => "starting",
            ManagerState::Running => "running",
            ManagerState::Stopping => "stopping",
            ManagerState::Stopped => "stopped",
            ManagerState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Orchestrator errors
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("A devnet needs at least one node")]
    InvalidNodeCount,

    #[error("Devnet already started")]
    AlreadyStarted,

    #[error("Identity allocation failed: {0}")]
    Allocation(#[from] AllocationError),

    #[error("Secret provisioning failed: {0}")]
    Secret(#[from] SecretError),

    #[error("Node {index} failed to launch: {source}")]
    Launch {
        index: usize,
        #[source]
        source: EngineError,
    },

    #[error("Node {index} at {endpoint} not ready after {timeout:?}")]
    NotReady {
        index: usize,
        endpoint: SocketAddr,
        timeout: Duration,
    },

    #[error("Node {index} failed to add peer {peer}: {source}")]
    Wiring {
        index: usize,
        peer: String,
        #[source]
        source: EngineError,
    },

    #[error("Devnet start cancelled")]
    Cancelled,
}

/// Provisions, wires and tears down a set of nodes launched by `E`
pub struct Manager<E: Engine> {
    engine: E,
    config: DevnetConfig,
    identities: Vec<NodeIdentity>,
    handles: Vec<Arc<E::Handle>>,
    token: CancellationToken,
    watcher: Option<JoinHandle<()>>,
    state: Arc<watch::Sender<ManagerState>>,
}

impl<E: Engine> Manager<E> {
    pub fn new(engine: E, config: DevnetConfig) -> Self {
        let (state, _) = watch::channel(ManagerState::Idle);

        Self {
            engine,
            config,
            identities: Vec::new(),
            handles: Vec::new(),
            token: CancellationToken::new(),
            watcher: None,
            state: Arc::new(state),
        }
    }

    /// Launched nodes, in launch order
    pub fn handles(&self) -> &[Arc<E::Handle>] {
        &self.handles
    }

    /// Identities of the current network, in launch order
    pub fn identities(&self) -> &[NodeIdentity] {
        &self.identities
    }

    pub fn state(&self) -> ManagerState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions
    pub fn subscribe(&self) -> watch::Receiver<ManagerState> {
        self.state.subscribe()
    }

    /// Token whose cancellation stops the network; a child of the token given to `start`
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    fn set_state(&self, state: ManagerState) {
        debug!("Devnet state: {}", state);
        self.state.send_replace(state);
    }

    /// Start `count` nodes and wire them into a full mesh.
    ///
    /// Cancelling `parent` stops the network, both during start (which then
    /// fails with [`ManagerError::Cancelled`]) and once it is running. On any
    /// error every node launched so far has been closed before this returns.
    pub async fn start(
        &mut self,
        parent: &CancellationToken,
        count: usize,
    ) -> Result<(), ManagerError> {
        if count == 0 {
            return Err(ManagerError::InvalidNodeCount);
        }
        if self.state() != ManagerState::Idle {
            return Err(ManagerError::AlreadyStarted);
        }

        self.set_state(ManagerState::Starting);
        self.token = parent.child_token();
        let token = self.token.clone();

        if let Err(e) = self.bring_up(&token, count).await {
            warn!("Devnet start failed: {}", e);
            self.rollback().await;
            self.set_state(ManagerState::Failed);
            return Err(e);
        }

        self.watcher = Some(self.spawn_watcher(token));
        self.set_state(ManagerState::Running);

        info!("✅ Devnet running with {} node(s)", self.handles.len());
        Ok(())
    }

    async fn bring_up(&mut self, token: &CancellationToken, count: usize) -> Result<(), ManagerError> {
        self.provision(count)?;
        ensure_active(token)?;

        self.launch(token).await?;
        ensure_active(token)?;

        self.await_readiness(token).await?;
        ensure_active(token)?;

        self.wire(token).await
    }

    /// Identities, secrets and peer lists
    fn provision(&mut self, count: usize) -> Result<(), ManagerError> {
        let options = IdentityOptions {
            enable_control: self.config.enable_control,
            producers: self.config.producers.clone(),
        };
        let mut identities = generate_identities(&self.config.base_dir, count, &options)?;

        for index in self.config.producers.iter().filter(|&&index| index >= count) {
            warn!(
                "⚠️ Producer index {} is out of range for {} node(s), ignoring it",
                index, count
            );
        }

        let producers = identities.iter().filter(|identity| identity.is_producer).count();
        if producers > 1 {
            warn!(
                "⚠️ {} block producers configured; a devnet normally has exactly one",
                producers
            );
        } else if producers == 0 {
            info!("No block producer configured; chain heads stay at genesis");
        }

        if self.config.enable_control {
            for identity in identities.iter_mut() {
                identity.control_secret_path = Some(generate_secret(&identity.data_dir)?);
            }
        }

        build_peer_lists(&mut identities);
        debug!(
            "Provisioned {} identities with {} peer entries",
            identities.len(),
            connection_count(&identities)
        );

        self.identities = identities;
        Ok(())
    }

    /// Start nodes one at a time in identity order
    async fn launch(&mut self, token: &CancellationToken) -> Result<(), ManagerError> {
        for identity in &self.identities {
            ensure_active(token)?;

            let handle = self
                .engine
                .start(identity)
                .await
                .map_err(|source| ManagerError::Launch {
                    index: identity.index,
                    source,
                })?;

            debug!("Launched node {} ({})", identity.index, handle.peer_id());
            self.handles.push(Arc::new(handle));
        }

        Ok(())
    }

    /// Poll every node concurrently; report the lowest failing index
    async fn await_readiness(&self, token: &CancellationToken) -> Result<(), ManagerError> {
        let interval = self.config.readiness_interval();
        let timeout = self.config.readiness_timeout();

        let probes = self
            .handles
            .iter()
            .map(|handle| wait_until_ready(handle.query_endpoint(), interval, timeout, token));
        let results = futures::future::join_all(probes).await;

        ensure_active(token)?;

        for (index, result) in results.into_iter().enumerate() {
            match result {
                Ok(()) => {}
                Err(ReadinessError::Cancelled) => return Err(ManagerError::Cancelled),
                Err(e) => {
                    debug!("Node {} readiness failed: {}", index, e);
                    return Err(ManagerError::NotReady {
                        index,
                        endpoint: self.handles[index].query_endpoint(),
                        timeout,
                    });
                }
            }
        }

        info!("All {} node(s) answering queries", self.handles.len());
        Ok(())
    }

    /// Hand every node its static peers
    async fn wire(&self, token: &CancellationToken) -> Result<(), ManagerError> {
        for (index, handle) in self.handles.iter().enumerate() {
            for peer in &self.identities[index].static_peers {
                ensure_active(token)?;

                handle
                    .add_peer(peer)
                    .await
                    .map_err(|source| ManagerError::Wiring {
                        index,
                        peer: peer.clone(),
                        source,
                    })?;
            }
        }

        Ok(())
    }

    /// Close every launched node; the handle list is empty afterwards
    async fn rollback(&mut self) {
        let handles = std::mem::take(&mut self.handles);
        if !handles.is_empty() {
            info!("Rolling back {} launched node(s)", handles.len());
            close_all(&handles).await;
        }
    }

    fn spawn_watcher(&self, token: CancellationToken) -> JoinHandle<()> {
        let handles = self.handles.clone();
        let state = self.state.clone();

        tokio::spawn(async move {
            token.cancelled().await;

            state.send_replace(ManagerState::Stopping);
            info!("🛑 Stopping devnet ({} node(s))", handles.len());

            close_all(&handles).await;

            state.send_replace(ManagerState::Stopped);
            info!("Devnet stopped");
        })
    }

    /// Stop the network and wait until every node is closed
    pub async fn wait(&mut self) {
        self.token.cancel();

        if let Some(watcher) = self.watcher.take() {
            if let Err(e) = watcher.await {
                warn!("Shutdown watcher failed: {}", e);
            }
        }
    }
}

impl<E: Engine> Drop for Manager<E> {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

fn ensure_active(token: &CancellationToken) -> Result<(), ManagerError> {
    if token.is_cancelled() {
        Err(ManagerError::Cancelled)
    } else {
        Ok(())
    }
}

/// Close handles in order; failures are logged and never stop the loop
async fn close_all<H: NodeHandle>(handles: &[Arc<H>]) {
    for (index, handle) in handles.iter().enumerate() {
        if let Err(e) = handle.close().await {
            warn!("Failed to close node {}: {}", index, e);
        }
    }
}
