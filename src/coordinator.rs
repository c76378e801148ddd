use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::config::CoordinatorConfig;
use crate::error::{PoolError, Result};
use crate::protocol::codec;
use crate::scheduler::{Outbound, Scheduler};
use crate::transport::{ConnId, Transport, TransportError};

/// Single-threaded event loop that owns the [`Scheduler`].
///
/// Each inbound payload is decoded and applied to the scheduler before the
/// next one is read. Resulting messages are written fire-and-forget: a failed
/// write is logged and never rolls back scheduler state.
pub struct Coordinator<T: Transport> {
    config: CoordinatorConfig,
    transport: T,
    scheduler: Scheduler,
}

impl<T: Transport> Coordinator<T> {
    pub fn new(config: CoordinatorConfig, transport: T) -> Result<Self> {
        config.validate()?;
        let scheduler = Scheduler::new(config.chunk_size);
        Ok(Self {
            config,
            transport,
            scheduler,
        })
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Run until `shutdown` is cancelled or the transport closes.
    ///
    /// Steady-state errors are absorbed so one bad connection never stops the
    /// loop. The only error returned is a failure to close the transport.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<Scheduler> {
        let timeout = self.config.assignment_timeout();
        let mut reap_interval =
            tokio::time::interval(Duration::from_millis(self.config.reap_interval_ms));
        reap_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tracing::info!(
            chunk_size = self.config.chunk_size,
            assignment_timeout_ms = ?self.config.assignment_timeout_ms,
            "Coordinator started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Shutdown requested, stopping coordinator");
                    break;
                }

                read = self.transport.read() => {
                    match read {
                        Ok((conn, payload)) => self.process(conn, &payload).await,
                        Err(TransportError::Disconnected(conn)) => {
                            let outbound = self.scheduler.handle_disconnect(conn);
                            self.flush(outbound).await;
                        }
                        Err(TransportError::Closed) => {
                            tracing::info!("Transport closed, stopping coordinator");
                            break;
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Transport read failed");
                        }
                    }
                }

                _ = reap_interval.tick(), if timeout.is_some() => {
                    if let Some(timeout) = timeout {
                        self.reap(timeout).await;
                    }
                }
            }
        }

        self.transport
            .close()
            .await
            .map_err(PoolError::Transport)?;
        tracing::info!("Coordinator stopped");
        Ok(self.scheduler)
    }

    async fn process(&mut self, conn: ConnId, payload: &[u8]) {
        let message = match codec::decode(payload) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(conn = %conn, error = %e, "Discarding malformed message");
                return;
            }
        };
        tracing::trace!(conn = %conn, kind = %message.kind(), "Message received");
        let outbound = self.scheduler.handle(conn, message);
        self.flush(outbound).await;
    }

    async fn reap(&mut self, timeout: Duration) {
        let (evicted, outbound) = self.scheduler.reap_stalled(Instant::now(), timeout);
        for conn in evicted {
            if let Err(e) = self.transport.disconnect(conn).await {
                tracing::debug!(conn = %conn, error = %e, "Failed to drop stalled miner");
            }
        }
        self.flush(outbound).await;
    }

    async fn flush(&self, outbound: Vec<Outbound>) {
        for Outbound { conn, message } in outbound {
            let kind = message.kind();
            if let Err(e) = self.transport.write(conn, codec::encode(&message)).await {
                tracing::warn!(conn = %conn, kind = %kind, error = %e, "Failed to send message");
            }
        }
    }
}
