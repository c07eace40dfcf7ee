// KratOs Devnet - Local multi-node test networks
// Principle: Every node is up and wired, or none is left running

pub mod cli;
pub mod config;
pub mod devnet;
pub mod network;
pub mod node;
pub mod rpc;

#[cfg(test)]
mod tests;

pub use config::DevnetConfig;
pub use devnet::{Engine, Manager, ManagerError, ManagerState, NodeHandle, NodeIdentity};
pub use node::DevEngine;
