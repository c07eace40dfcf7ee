// Node - Embedded dev node launched by the devnet engine

pub mod producer;
pub mod service;

pub use service::{DevEngine, DevNode};
