//! Speech delivery: backends and the fallback chain

pub mod backend;
pub mod backends;
pub mod chain;

pub use backend::{create_backends, Backend, BackendSet};
pub use chain::{Attempt, BackendChain};
