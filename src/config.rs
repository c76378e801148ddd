use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{PoolError, Result};

/// Default number of nonces carved into a single chunk.
pub const DEFAULT_CHUNK_SIZE: u64 = 10_000;

/// Configuration for the coordinator process.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Address the transport server listens on
    pub listen_addr: SocketAddr,
    /// Maximum width of a chunk handed to one miner. Must be at least 1.
    pub chunk_size: u64,
    /// Evict a miner whose chunk has been outstanding this long.
    /// `None` disables the deadline, so a silent miner holds its chunk until it disconnects.
    pub assignment_timeout_ms: Option<u64>,
    /// How often the deadline is checked
    pub reap_interval_ms: u64,
    /// Capacity of the single inbound queue that serializes all connections
    pub inbound_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            // SAFETY: This is a hardcoded valid address that will always parse
            listen_addr: "127.0.0.1:50061"
                .parse()
                .expect("default listen address is valid"),
            chunk_size: DEFAULT_CHUNK_SIZE,
            assignment_timeout_ms: None,
            reap_interval_ms: 1000,
            inbound_capacity: 1024,
        }
    }
}

impl CoordinatorConfig {
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            ..Default::default()
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_assignment_timeout(mut self, timeout_ms: u64) -> Self {
        self.assignment_timeout_ms = Some(timeout_ms);
        self
    }

    pub fn assignment_timeout(&self) -> Option<Duration> {
        self.assignment_timeout_ms.map(Duration::from_millis)
    }

    /// Reject settings the scheduler cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(PoolError::InvalidConfig(
                "chunk_size must be at least 1".to_string(),
            ));
        }
        if self.reap_interval_ms == 0 {
            return Err(PoolError::InvalidConfig(
                "reap_interval_ms must be at least 1".to_string(),
            ));
        }
        if self.inbound_capacity == 0 {
            return Err(PoolError::InvalidConfig(
                "inbound_capacity must be at least 1".to_string(),
            ));
        }
        if self.assignment_timeout_ms == Some(0) {
            return Err(PoolError::InvalidConfig(
                "assignment_timeout_ms must be at least 1 when set".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration for a miner process.
#[derive(Debug, Clone)]
pub struct MinerConfig {
    pub server_addr: String, // host:port or http://host:port
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:50061".to_string(),
        }
    }
}
