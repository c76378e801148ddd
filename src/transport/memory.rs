use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::transport::{ConnId, Connection, Transport, TransportError};

type Inbound = (ConnId, Result<Vec<u8>, TransportError>);
type PeerMap = Arc<Mutex<HashMap<ConnId, mpsc::UnboundedSender<Vec<u8>>>>>;

fn lock_peers(
    peers: &PeerMap,
) -> std::sync::MutexGuard<'_, HashMap<ConnId, mpsc::UnboundedSender<Vec<u8>>>> {
    peers.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-process transport. Connections are opened through a [`MemoryConnector`].
pub struct MemoryTransport {
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    inbound_rx: mpsc::UnboundedReceiver<Inbound>,
    peers: PeerMap,
    next_id: Arc<AtomicU64>,
    evicted: Mutex<HashSet<ConnId>>,
    closed: bool,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            inbound_tx,
            inbound_rx,
            peers: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            evicted: Mutex::new(HashSet::new()),
            closed: false,
        }
    }

    /// Handle for opening connections, usable after the transport moves into a coordinator
    pub fn connector(&self) -> MemoryConnector {
        MemoryConnector {
            inbound_tx: self.inbound_tx.clone(),
            peers: self.peers.clone(),
            next_id: self.next_id.clone(),
        }
    }

    /// Number of open connections
    pub fn connection_count(&self) -> usize {
        lock_peers(&self.peers).len()
    }

    fn evicted_lock(&self) -> std::sync::MutexGuard<'_, HashSet<ConnId>> {
        self.evicted.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn read(&mut self) -> Result<(ConnId, Vec<u8>), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        loop {
            match self.inbound_rx.recv().await {
                Some((conn, Ok(payload))) => {
                    if self.evicted_lock().contains(&conn) {
                        tracing::debug!(conn = %conn, "Dropping payload from evicted connection");
                        continue;
                    }
                    return Ok((conn, payload));
                }
                Some((conn, Err(e))) => {
                    if matches!(e, TransportError::Disconnected(_)) {
                        self.evicted_lock().remove(&conn);
                    }
                    return Err(e);
                }
                None => return Err(TransportError::Closed),
            }
        }
    }

    async fn write(&self, conn: ConnId, payload: Vec<u8>) -> Result<(), TransportError> {
        let peers = lock_peers(&self.peers);
        let tx = peers
            .get(&conn)
            .ok_or(TransportError::UnknownConnection(conn))?;
        tx.send(payload)
            .map_err(|_| TransportError::Disconnected(conn))
    }

    async fn disconnect(&self, conn: ConnId) -> Result<(), TransportError> {
        lock_peers(&self.peers)
            .remove(&conn)
            .ok_or(TransportError::UnknownConnection(conn))?;
        self.evicted_lock().insert(conn);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.closed = true;
        lock_peers(&self.peers).clear();
        self.inbound_rx.close();
        Ok(())
    }
}

/// Opens connections to a [`MemoryTransport`]
#[derive(Clone)]
pub struct MemoryConnector {
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    peers: PeerMap,
    next_id: Arc<AtomicU64>,
}

impl MemoryConnector {
    pub fn connect(&self) -> MemoryConnection {
        let id = ConnId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = mpsc::unbounded_channel();
        lock_peers(&self.peers).insert(id, tx);
        MemoryConnection {
            id,
            inbound_tx: self.inbound_tx.clone(),
            outbound_rx: rx,
            peers: self.peers.clone(),
            closed: false,
        }
    }
}

/// One peer's end of a [`MemoryTransport`]. Dropping it reports a disconnect.
pub struct MemoryConnection {
    id: ConnId,
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    outbound_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    peers: PeerMap,
    closed: bool,
}

impl MemoryConnection {
    pub fn id(&self) -> ConnId {
        self.id
    }

    fn hang_up(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        lock_peers(&self.peers).remove(&self.id);
        let _ = self
            .inbound_tx
            .send((self.id, Err(TransportError::Disconnected(self.id))));
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn read(&mut self) -> Result<Vec<u8>, TransportError> {
        self.outbound_rx.recv().await.ok_or(TransportError::Closed)
    }

    async fn write(&mut self, payload: Vec<u8>) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.inbound_tx
            .send((self.id, Ok(payload)))
            .map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.hang_up();
        Ok(())
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.hang_up();
    }
}
