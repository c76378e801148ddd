//! Protobuf encoding of [`ProtocolMessage`].

use prost::Message;
use thiserror::Error;

use crate::proto::{MessageKind as ProtoMessageKind, TaskMessage};
use crate::protocol::{MessageKind, ProtocolMessage, WorkRequest, WorkResult};

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("invalid protobuf payload: {0}")]
    Protobuf(#[from] prost::DecodeError),

    #[error("unknown message kind {0}")]
    UnknownKind(i32),

    #[error("empty work range [{lower}, {upper})")]
    EmptyRange { lower: u64, upper: u64 },
}

impl From<MessageKind> for ProtoMessageKind {
    fn from(kind: MessageKind) -> Self {
        match kind {
            MessageKind::Join => Self::Join,
            MessageKind::WorkRequest => Self::WorkRequest,
            MessageKind::WorkResult => Self::WorkResult,
        }
    }
}

impl From<&ProtocolMessage> for TaskMessage {
    fn from(message: &ProtocolMessage) -> Self {
        let kind = ProtoMessageKind::from(message.kind()) as i32;
        match message {
            ProtocolMessage::Join => TaskMessage {
                kind,
                ..Default::default()
            },
            ProtocolMessage::WorkRequest(req) => TaskMessage {
                kind,
                data: req.data.clone(),
                lower: req.lower,
                upper: req.upper,
                ..Default::default()
            },
            ProtocolMessage::WorkResult(res) => TaskMessage {
                kind,
                hash: res.hash,
                nonce: res.nonce,
                ..Default::default()
            },
        }
    }
}

impl TryFrom<TaskMessage> for ProtocolMessage {
    type Error = DecodeError;

    fn try_from(msg: TaskMessage) -> Result<Self, Self::Error> {
        match ProtoMessageKind::try_from(msg.kind) {
            Ok(ProtoMessageKind::Join) => Ok(ProtocolMessage::Join),
            Ok(ProtoMessageKind::WorkRequest) => Ok(ProtocolMessage::WorkRequest(
                WorkRequest::new(msg.data, msg.lower, msg.upper)?,
            )),
            Ok(ProtoMessageKind::WorkResult) => Ok(ProtocolMessage::WorkResult(WorkResult {
                hash: msg.hash,
                nonce: msg.nonce,
            })),
            Ok(ProtoMessageKind::Unspecified) | Err(_) => Err(DecodeError::UnknownKind(msg.kind)),
        }
    }
}

pub fn encode(message: &ProtocolMessage) -> Vec<u8> {
    TaskMessage::from(message).encode_to_vec()
}

pub fn decode(payload: &[u8]) -> Result<ProtocolMessage, DecodeError> {
    TaskMessage::decode(payload)?.try_into()
}
