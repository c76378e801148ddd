//! Messages exchanged between the coordinator, miners and clients.
//!
//! Every peer speaks the same three message kinds:
//!
//! - [`ProtocolMessage::Join`]: a miner announces it is available
//! - [`ProtocolMessage::WorkRequest`]: a client asks for a full range, or the
//!   coordinator hands a chunk of that range to a miner
//! - [`ProtocolMessage::WorkResult`]: a miner reports the best nonce of its
//!   chunk, or the coordinator reports the final answer to a client
//!
//! On the wire each message is a protobuf `TaskMessage`, see [`codec`].

pub mod codec;

pub use codec::{decode, encode, DecodeError};

/// Message discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Join,
    WorkRequest,
    WorkResult,
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageKind::Join => write!(f, "join"),
            MessageKind::WorkRequest => write!(f, "work_request"),
            MessageKind::WorkResult => write!(f, "work_result"),
        }
    }
}

/// A search over the half-open nonce range `[lower, upper)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkRequest {
    pub data: Vec<u8>,
    pub lower: u64,
    pub upper: u64,
}

impl WorkRequest {
    /// Build a request, rejecting empty ranges.
    pub fn new(data: impl Into<Vec<u8>>, lower: u64, upper: u64) -> Result<Self, DecodeError> {
        if lower >= upper {
            return Err(DecodeError::EmptyRange { lower, upper });
        }
        Ok(Self {
            data: data.into(),
            lower,
            upper,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.lower >= self.upper
    }
}

/// Smallest hash found and the nonce that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkResult {
    pub hash: u64,
    pub nonce: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolMessage {
    Join,
    WorkRequest(WorkRequest),
    WorkResult(WorkResult),
}

impl ProtocolMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            ProtocolMessage::Join => MessageKind::Join,
            ProtocolMessage::WorkRequest(_) => MessageKind::WorkRequest,
            ProtocolMessage::WorkResult(_) => MessageKind::WorkResult,
        }
    }
}

impl From<WorkRequest> for ProtocolMessage {
    fn from(request: WorkRequest) -> Self {
        ProtocolMessage::WorkRequest(request)
    }
}

impl From<WorkResult> for ProtocolMessage {
    fn from(result: WorkResult) -> Self {
        ProtocolMessage::WorkResult(result)
    }
}
