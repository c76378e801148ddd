use crate::error::{PoolError, Result};
use crate::protocol::{codec, ProtocolMessage, WorkRequest, WorkResult};
use crate::transport::Connection;

/// Submit one search and wait for the coordinator's final answer.
///
/// The coordinator replies exactly once, after every chunk of the range has
/// been mined. A reply that does not decode to a `WorkResult` is an error.
pub async fn search<C: Connection>(conn: &mut C, request: WorkRequest) -> Result<WorkResult> {
    let (lower, upper) = (request.lower, request.upper);
    conn.write(codec::encode(&ProtocolMessage::WorkRequest(request)))
        .await?;
    tracing::debug!(lower, upper, "Work request sent");

    let payload = conn.read().await?;
    match codec::decode(&payload)? {
        ProtocolMessage::WorkResult(result) => Ok(result),
        other => Err(PoolError::Protocol(format!(
            "expected work_result, got {}",
            other.kind()
        ))),
    }
}
