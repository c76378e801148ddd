//! Connection-identified message channels.
//!
//! The coordinator only needs to read the next payload from any connection,
//! write a payload to one connection, and close everything. Miners and
//! clients hold a single [`Connection`] to the coordinator.
//!
//! # Implementations
//!
//! - [`memory`]: in-process channels, used by tests
//! - [`grpc`]: one bidirectional gRPC stream per peer

use async_trait::async_trait;
use thiserror::Error;

pub mod grpc;
pub mod memory;

pub use grpc::{GrpcConnection, GrpcTransport};
pub use memory::{MemoryConnection, MemoryConnector, MemoryTransport};

/// Identity the transport assigns to each accepted connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(pub u64);

impl std::fmt::Display for ConnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection {0} lost")]
    Disconnected(ConnId),

    #[error("unknown connection {0}")]
    UnknownConnection(ConnId),

    #[error("transport closed")]
    Closed,

    #[error("rpc failure: {0}")]
    Rpc(String),
}

/// Coordinator side of the transport
#[async_trait]
pub trait Transport: Send {
    /// Next payload from any connection.
    ///
    /// A per-connection failure is reported as [`TransportError::Disconnected`];
    /// [`TransportError::Closed`] means no further reads will succeed.
    async fn read(&mut self) -> Result<(ConnId, Vec<u8>), TransportError>;

    /// Best-effort send to one connection
    async fn write(&self, conn: ConnId, payload: Vec<u8>) -> Result<(), TransportError>;

    /// Drop a single connection.
    ///
    /// Nothing more is written to it, and payloads it sends afterwards are
    /// discarded by [`Transport::read`]. Its eventual hang-up is still reported.
    async fn disconnect(&self, conn: ConnId) -> Result<(), TransportError>;

    /// Release every connection
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Peer side of the transport: one connection to the coordinator
#[async_trait]
pub trait Connection: Send {
    async fn read(&mut self) -> Result<Vec<u8>, TransportError>;

    async fn write(&mut self, payload: Vec<u8>) -> Result<(), TransportError>;

    async fn close(&mut self) -> Result<(), TransportError>;
}
