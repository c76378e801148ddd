use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::{ReceiverStream, TcpListenerStream};
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;
use tonic::{Request, Response, Status, Streaming};

use crate::error::Result;
use crate::proto::miner_transport_client::MinerTransportClient;
use crate::proto::miner_transport_server::{MinerTransport, MinerTransportServer};
use crate::proto::Frame;
use crate::transport::{ConnId, Connection, Transport, TransportError};

type Inbound = (ConnId, std::result::Result<Vec<u8>, TransportError>);
type PeerMap = Arc<Mutex<HashMap<ConnId, mpsc::Sender<std::result::Result<Frame, Status>>>>>;
type FrameStream = Pin<Box<dyn tokio_stream::Stream<Item = std::result::Result<Frame, Status>> + Send>>;

const PEER_BUFFER: usize = 64;
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// gRPC service that turns every `Attach` stream into one transport connection
struct AttachService {
    next_id: Arc<AtomicU64>,
    inbound_tx: mpsc::Sender<Inbound>,
    peers: PeerMap,
}

#[tonic::async_trait]
impl MinerTransport for AttachService {
    type AttachStream = FrameStream;

    async fn attach(
        &self,
        request: Request<Streaming<Frame>>,
    ) -> std::result::Result<Response<Self::AttachStream>, Status> {
        let conn = ConnId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let remote = request.remote_addr();
        let (tx, rx) = mpsc::channel(PEER_BUFFER);
        self.peers.lock().await.insert(conn, tx);
        tracing::debug!(conn = %conn, remote = ?remote, "Connection attached");

        let mut inbound = request.into_inner();
        let inbound_tx = self.inbound_tx.clone();
        let peers = self.peers.clone();
        tokio::spawn(async move {
            loop {
                match inbound.message().await {
                    Ok(Some(frame)) => {
                        if inbound_tx.send((conn, Ok(frame.payload))).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(status) => {
                        tracing::debug!(conn = %conn, error = %status, "Connection stream failed");
                        break;
                    }
                }
            }
            peers.lock().await.remove(&conn);
            let _ = inbound_tx
                .send((conn, Err(TransportError::Disconnected(conn))))
                .await;
        });

        let stream = ReceiverStream::new(rx);
        Ok(Response::new(Box::pin(stream) as Self::AttachStream))
    }
}

/// Coordinator side of the gRPC transport.
///
/// Every attached peer's frames are funnelled into one bounded queue, so
/// [`Transport::read`] yields messages from all connections in arrival order.
pub struct GrpcTransport {
    local_addr: SocketAddr,
    inbound_rx: mpsc::Receiver<Inbound>,
    peers: PeerMap,
    evicted: Mutex<HashSet<ConnId>>,
    shutdown: CancellationToken,
    server: Option<JoinHandle<std::result::Result<(), tonic::transport::Error>>>,
}

impl GrpcTransport {
    /// Bind `addr` and start accepting connections
    pub async fn bind(addr: SocketAddr, inbound_capacity: usize) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let (inbound_tx, inbound_rx) = mpsc::channel(inbound_capacity.max(1));
        let peers: PeerMap = Arc::new(Mutex::new(HashMap::new()));

        let service = AttachService {
            next_id: Arc::new(AtomicU64::new(1)),
            inbound_tx,
            peers: peers.clone(),
        };

        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        tracing::info!(addr = %local_addr, "Starting transport server");
        let server = tokio::spawn(async move {
            Server::builder()
                .add_service(MinerTransportServer::new(service))
                .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async move {
                    signal.cancelled().await
                })
                .await
        });

        Ok(Self {
            local_addr,
            inbound_rx,
            peers,
            evicted: Mutex::new(HashSet::new()),
            shutdown,
            server: Some(server),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

#[async_trait]
impl Transport for GrpcTransport {
    async fn read(&mut self) -> std::result::Result<(ConnId, Vec<u8>), TransportError> {
        loop {
            match self.inbound_rx.recv().await {
                Some((conn, Ok(payload))) => {
                    if self.evicted.lock().await.contains(&conn) {
                        tracing::debug!(conn = %conn, "Dropping frame from evicted connection");
                        continue;
                    }
                    return Ok((conn, payload));
                }
                Some((conn, Err(e))) => {
                    if matches!(e, TransportError::Disconnected(_)) {
                        self.evicted.lock().await.remove(&conn);
                    }
                    return Err(e);
                }
                None => return Err(TransportError::Closed),
            }
        }
    }

    async fn write(&self, conn: ConnId, payload: Vec<u8>) -> std::result::Result<(), TransportError> {
        let tx = self
            .peers
            .lock()
            .await
            .get(&conn)
            .cloned()
            .ok_or(TransportError::UnknownConnection(conn))?;
        tx.send(Ok(Frame { payload }))
            .await
            .map_err(|_| TransportError::Disconnected(conn))
    }

    async fn disconnect(&self, conn: ConnId) -> std::result::Result<(), TransportError> {
        // Dropping the sender ends the peer's response stream
        self.peers
            .lock()
            .await
            .remove(&conn)
            .ok_or(TransportError::UnknownConnection(conn))?;
        self.evicted.lock().await.insert(conn);
        Ok(())
    }

    async fn close(&mut self) -> std::result::Result<(), TransportError> {
        self.peers.lock().await.clear();
        self.shutdown.cancel();
        self.inbound_rx.close();

        if let Some(server) = self.server.take() {
            match tokio::time::timeout(SHUTDOWN_GRACE, server).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => return Err(TransportError::Rpc(e.to_string())),
                Ok(Err(e)) => return Err(TransportError::Rpc(e.to_string())),
                Err(_) => {
                    tracing::warn!("Transport server did not stop within grace period");
                }
            }
        }
        tracing::info!(addr = %self.local_addr, "Transport server stopped");
        Ok(())
    }
}

/// Miner or client side of the gRPC transport
pub struct GrpcConnection {
    outbound: Option<mpsc::Sender<Frame>>,
    inbound: Streaming<Frame>,
}

impl GrpcConnection {
    /// Connect to a coordinator at `addr` (`host:port` or a full `http://` URI)
    pub async fn connect(addr: &str) -> Result<Self> {
        let uri = if addr.starts_with("http://") || addr.starts_with("https://") {
            addr.to_string()
        } else {
            format!("http://{}", addr)
        };
        let mut client = MinerTransportClient::connect(uri).await?;
        let (tx, rx) = mpsc::channel(PEER_BUFFER);
        let inbound = client.attach(ReceiverStream::new(rx)).await?.into_inner();
        Ok(Self {
            outbound: Some(tx),
            inbound,
        })
    }
}

#[async_trait]
impl Connection for GrpcConnection {
    async fn read(&mut self) -> std::result::Result<Vec<u8>, TransportError> {
        match self.inbound.message().await {
            Ok(Some(frame)) => Ok(frame.payload),
            Ok(None) => Err(TransportError::Closed),
            Err(status) => Err(TransportError::Rpc(status.to_string())),
        }
    }

    async fn write(&mut self, payload: Vec<u8>) -> std::result::Result<(), TransportError> {
        let tx = self.outbound.as_ref().ok_or(TransportError::Closed)?;
        tx.send(Frame { payload })
            .await
            .map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self) -> std::result::Result<(), TransportError> {
        // Ending the request stream tells the coordinator we are gone
        self.outbound.take();
        Ok(())
    }
}
