//! Miner side of the pool.
//!
//! A miner connects to the coordinator, announces itself with a join
//! message and then loops:
//!
//! 1. Wait for a chunk (`WorkRequest`)
//! 2. Scan every nonce in the chunk with the search function ([`hash`] by default)
//! 3. Reply with the smallest hash and its nonce (`WorkResult`)
//!
//! Mining runs on a blocking thread so the connection stays responsive to shutdown.

pub mod miner;

pub use miner::{hash, mine, HashFn, Miner};
