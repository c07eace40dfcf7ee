// Ports - Process-wide allocator for unused loopback TCP ports
// Principle: A port is handed out at most once per process

use std::collections::HashSet;
use std::net::{Ipv4Addr, TcpListener};
use std::sync::{Mutex, OnceLock};
use tracing::debug;

/// Maximum number of bind probes before giving up on a single allocation
pub const MAX_PORT_ATTEMPTS: usize = 64;

/// Every port handed out by this process, across all managers
fn allocated_ports() -> &'static Mutex<HashSet<u16>> {
    static ALLOCATED: OnceLock<Mutex<HashSet<u16>>> = OnceLock::new();
    ALLOCATED.get_or_init(|| Mutex::new(HashSet::new()))
}

/// Reserve a port that is free on the host and was never handed out before.
///
/// The probe socket stays bound until the port is recorded in the registry,
/// so two concurrent callers can never observe the same port as free.
pub fn allocate_port() -> Result<u16, AllocationError> {
    let mut allocated = allocated_ports()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    for _ in 0..MAX_PORT_ATTEMPTS {
        let probe = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
        let port = probe.local_addr()?.port();

        if allocated.insert(port) {
            drop(probe);
            debug!("Allocated port {}", port);
            return Ok(port);
        }

        debug!("Port {} already handed out, probing again", port);
    }

    Err(AllocationError::Exhausted {
        attempts: MAX_PORT_ATTEMPTS,
    })
}

/// Reserve `count` distinct ports
pub fn allocate_ports(count: usize) -> Result<Vec<u16>, AllocationError> {
    (0..count).map(|_| allocate_port()).collect()
}

/// Allocation errors (fatal to a network start)
#[derive(Debug, thiserror::Error)]
pub enum AllocationError {
    #[error("IO error while probing for a free port: {0}")]
    Io(#[from] std::io::Error),

    #[error("No unused port found after {attempts} probes")]
    Exhausted { attempts: usize },

    #[error("Key error: {0}")]
    Key(String),
}
