use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

use crate::error::{PoolError, Result};
use crate::protocol::{codec, ProtocolMessage, WorkRequest, WorkResult};
use crate::transport::{Connection, TransportError};

/// Search function applied to every nonce
pub type HashFn = fn(&[u8], u64) -> u64;

/// First 8 bytes (little-endian) of SHA-256 over `data` followed by the
/// little-endian nonce.
pub fn hash(data: &[u8], nonce: u64) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.update(nonce.to_le_bytes());
    let digest = hasher.finalize();
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(head)
}

/// Scan `[lower, upper)` and return the smallest hash with the first nonce that produced it.
///
/// An empty range yields `(u64::MAX, u64::MAX)`.
pub fn mine(hash_fn: HashFn, data: &[u8], lower: u64, upper: u64) -> WorkResult {
    let mut best = WorkResult {
        hash: u64::MAX,
        nonce: u64::MAX,
    };
    for nonce in lower..upper {
        let h = hash_fn(data, nonce);
        if h < best.hash {
            best = WorkResult { hash: h, nonce };
        }
    }
    best
}

/// Worker loop: join the coordinator, then mine every chunk it hands out.
#[derive(Debug, Clone)]
pub struct Miner {
    hash_fn: HashFn,
}

impl Default for Miner {
    fn default() -> Self {
        Self::new()
    }
}

impl Miner {
    pub fn new() -> Self {
        Self { hash_fn: hash }
    }

    /// Use a different search function
    pub fn with_hash(hash_fn: HashFn) -> Self {
        Self { hash_fn }
    }

    /// Compute the result for one chunk on a blocking thread
    pub async fn work(&self, request: WorkRequest) -> Result<WorkResult> {
        let hash_fn = self.hash_fn;
        tokio::task::spawn_blocking(move || {
            mine(hash_fn, &request.data, request.lower, request.upper)
        })
        .await
        .map_err(|e| PoolError::Internal(format!("mining task failed: {}", e)))
    }

    /// Run until the coordinator closes the connection or `shutdown` fires.
    ///
    /// Returns the number of chunks completed.
    pub async fn run<C: Connection>(&self, conn: &mut C, shutdown: CancellationToken) -> Result<u64> {
        conn.write(codec::encode(&ProtocolMessage::Join)).await?;
        tracing::info!("Joined coordinator");

        let mut completed = 0u64;
        loop {
            let payload = tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(completed, "Shutdown requested, leaving pool");
                    break;
                }
                read = conn.read() => match read {
                    Ok(payload) => payload,
                    Err(TransportError::Closed) => {
                        tracing::info!(completed, "Coordinator closed the connection");
                        break;
                    }
                    Err(e) => return Err(e.into()),
                },
            };

            let request = match codec::decode(&payload) {
                Ok(ProtocolMessage::WorkRequest(request)) => request,
                Ok(other) => {
                    tracing::debug!(kind = %other.kind(), "Ignoring unexpected message");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Ignoring malformed message");
                    continue;
                }
            };

            tracing::debug!(lower = request.lower, upper = request.upper, "Mining chunk");
            let result = self.work(request).await?;
            conn.write(codec::encode(&ProtocolMessage::WorkResult(result)))
                .await?;
            completed += 1;
        }

        conn.close().await?;
        Ok(completed)
    }
}
