// Network - P2P layer of the dev node
// Principle: Static peers only, no discovery

pub mod behaviour;
pub mod peer;
pub mod protocol;
pub mod service;

pub use service::{NetworkError, NetworkEvent, NetworkHandle, NetworkService};
