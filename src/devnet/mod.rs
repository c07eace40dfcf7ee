// Devnet - Provisioning and orchestration of local test networks
// Principle: Allocate everything up front, launch in order, roll back on any failure

pub mod engine;
pub mod identity;
pub mod manager;
pub mod ports;
pub mod readiness;
pub mod secret;
pub mod topology;

pub use engine::{Engine, EngineError, NodeHandle};
pub use identity::{generate_identities, IdentityOptions, NodeIdentity};
pub use manager::{Manager, ManagerError, ManagerState};
pub use secret::{generate_secret, read_secret, SecretError};
