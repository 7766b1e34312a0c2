//! DEK lifecycle management: create, fetch, cache, rotate, revoke.

pub mod manager;

pub use manager::{KeyManager, KeyStatistics};
