//! Integration tests over the gRPC transport.
//!
//! These bind a real coordinator on an ephemeral local port and connect
//! miners and clients to it over TCP, using the production hash.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use minepool::client;
use minepool::config::CoordinatorConfig;
use minepool::coordinator::Coordinator;
use minepool::error::Result;
use minepool::protocol::{codec, ProtocolMessage, WorkRequest, WorkResult};
use minepool::scheduler::Scheduler;
use minepool::transport::{Connection, GrpcConnection, GrpcTransport};
use minepool::worker::{hash, mine, Miner};

struct GrpcPool {
    addr: SocketAddr,
    shutdown: CancellationToken,
    handle: JoinHandle<Result<Scheduler>>,
}

impl GrpcPool {
    async fn start(chunk_size: u64) -> Self {
        let config = CoordinatorConfig::new("127.0.0.1:0".parse().unwrap()).with_chunk_size(chunk_size);
        let transport = GrpcTransport::bind(config.listen_addr, config.inbound_capacity)
            .await
            .expect("bind succeeds");
        let addr = transport.local_addr();
        let coordinator = Coordinator::new(config, transport).expect("valid config");
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(coordinator.run(shutdown.clone()));
        Self {
            addr,
            shutdown,
            handle,
        }
    }

    fn spawn_miner(&self, token: CancellationToken) -> JoinHandle<Result<u64>> {
        let addr = self.addr.to_string();
        tokio::spawn(async move {
            let mut conn = GrpcConnection::connect(&addr).await?;
            Miner::new().run(&mut conn, token).await
        })
    }

    async fn search(&self, data: &str, lower: u64, upper: u64) -> Result<WorkResult> {
        let mut conn = GrpcConnection::connect(&self.addr.to_string()).await?;
        let request = WorkRequest::new(data, lower, upper).expect("non-empty range");
        client::search(&mut conn, request).await
    }

    async fn stop(self) -> Scheduler {
        self.shutdown.cancel();
        self.handle
            .await
            .expect("coordinator task panicked")
            .expect("coordinator stopped cleanly")
    }
}

/// Test 1: Miners and a client find the minimum over a real network connection
#[tokio::test]
async fn test_grpc_end_to_end() {
    let pool = GrpcPool::start(500).await;
    let miners = CancellationToken::new();
    let handles: Vec<_> = (0..2).map(|_| pool.spawn_miner(miners.clone())).collect();

    let result = tokio::time::timeout(Duration::from_secs(30), pool.search("hello", 0, 3_000))
        .await
        .expect("search finishes in time")
        .expect("search succeeds");
    assert_eq!(result, mine(hash, b"hello", 0, 3_000));

    miners.cancel();
    for handle in handles {
        handle.await.expect("miner task panicked").expect("miner stopped cleanly");
    }
    let sched = pool.stop().await;
    assert_eq!(sched.client_count(), 0);
}

/// Test 2: A chunk held by a miner that hangs up is finished by another miner
#[tokio::test]
async fn test_grpc_miner_failover() {
    let pool = GrpcPool::start(100).await;

    let mut flaky = GrpcConnection::connect(&pool.addr.to_string())
        .await
        .expect("connect");
    flaky
        .write(codec::encode(&ProtocolMessage::Join))
        .await
        .expect("join");

    let search = {
        let addr = pool.addr;
        tokio::spawn(async move {
            let mut conn = GrpcConnection::connect(&addr.to_string()).await?;
            let request = WorkRequest::new("failover", 0, 400).expect("non-empty range");
            client::search(&mut conn, request).await
        })
    };

    let payload = tokio::time::timeout(Duration::from_secs(10), flaky.read())
        .await
        .expect("chunk arrives in time")
        .expect("read succeeds");
    let chunk = match codec::decode(&payload).expect("valid message") {
        ProtocolMessage::WorkRequest(chunk) => chunk,
        other => panic!("expected a chunk, got {:?}", other),
    };
    assert_eq!((chunk.lower, chunk.upper), (0, 100));
    flaky.close().await.expect("close");
    drop(flaky);

    let miners = CancellationToken::new();
    let miner = pool.spawn_miner(miners.clone());

    let result = tokio::time::timeout(Duration::from_secs(30), search)
        .await
        .expect("search finishes in time")
        .expect("search task panicked")
        .expect("search succeeds");
    assert_eq!(result, mine(hash, b"failover", 0, 400));

    miners.cancel();
    miner.await.expect("miner task panicked").expect("miner stopped cleanly");
    pool.stop().await;
}

/// Test 3: Connecting to a closed port fails with an error rather than hanging
#[tokio::test]
async fn test_connect_refused() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let result = tokio::time::timeout(
        Duration::from_secs(10),
        GrpcConnection::connect(&addr.to_string()),
    )
    .await
    .expect("connect returns in time");
    assert!(result.is_err());
}
