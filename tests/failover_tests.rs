//! Failover tests for miner and client disconnects.
//!
//! These tests drive a running coordinator with hand-controlled peers so
//! that every chunk assignment can be observed, then drop peers at chosen
//! points and check where their work goes.


use std::time::Duration;

use minepool::config::CoordinatorConfig;
use minepool::protocol::{ProtocolMessage, WorkRequest, WorkResult};
use test_harness::{expected_min, test_hash, TestPool};

fn config(chunk_size: u64) -> CoordinatorConfig {
    CoordinatorConfig::default().with_chunk_size(chunk_size)
}

/// Test 1: A dropped miner's chunk is reissued verbatim to the next miner that joins
#[tokio::test]
async fn test_orphaned_chunk_reissued_to_new_miner() {
    let pool = TestPool::start(config(10_000));

    let mut a = pool.connect();
    let mut b = pool.connect();
    let mut client = pool.connect();
    a.join().await;
    b.join().await;
    client.request("block", 0, 20_000).await;

    let chunk_a = a.recv_chunk().await;
    let chunk_b = b.recv_chunk().await;
    assert_eq!((chunk_a.lower, chunk_a.upper), (0, 10_000));
    assert_eq!((chunk_b.lower, chunk_b.upper), (10_000, 20_000));

    a.disconnect().await;

    let mut c = pool.connect();
    c.join().await;
    let reissued = c.recv_chunk().await;
    assert_eq!(reissued, chunk_a);

    b.reply(900, 15_000).await;
    c.reply(100, 3).await;
    assert_eq!(client.recv_result().await, WorkResult { hash: 100, nonce: 3 });

    let sched = pool.shutdown().await;
    assert_eq!(sched.client_count(), 0);
    assert!(sched.backlog().is_empty());
}

/// Test 2: A busy miner that finishes picks up the orphan before fresh work
#[tokio::test]
async fn test_surviving_miner_takes_orphan_first() {
    let pool = TestPool::start(config(10));

    let mut a = pool.connect();
    let mut b = pool.connect();
    let mut client = pool.connect();
    a.join().await;
    b.join().await;
    client.request("block", 0, 30).await;

    let chunk_a = a.recv_chunk().await;
    let chunk_b = b.recv_chunk().await;
    assert_eq!(chunk_b.lower, 10);

    a.disconnect().await;
    b.reply(50, 12).await;
    assert_eq!(b.recv_chunk().await, chunk_a);
    b.reply(20, 4).await;
    let last = b.recv_chunk().await;
    assert_eq!((last.lower, last.upper), (20, 30));
    b.reply(70, 25).await;

    assert_eq!(client.recv_result().await, WorkResult { hash: 20, nonce: 4 });
    pool.shutdown().await;
}

/// Test 3: A request survives losing every miner and finishes once one returns
#[tokio::test]
async fn test_request_survives_total_miner_loss() {
    let mut pool = TestPool::start(config(500));

    let mut a = pool.connect();
    let mut client = pool.connect();
    a.join().await;
    client.request("block", 0, 3_000).await;
    a.recv_chunk().await;
    a.disconnect().await;

    // Nothing can be answered while no miner is attached
    assert!(client
        .recv_within(Duration::from_millis(100))
        .await
        .is_none());

    pool.spawn_miner(test_hash);
    let result = client.recv_result().await;
    assert_eq!(result, expected_min(test_hash, b"block", 0, 3_000));

    pool.shutdown().await;
}

/// Test 4: A client that leaves mid-search frees its miners for the next client
#[tokio::test]
async fn test_client_disconnect_frees_miners() {
    let pool = TestPool::start(config(10));

    let mut a = pool.connect();
    let mut first = pool.connect();
    a.join().await;
    first.request("first", 0, 100).await;
    let chunk = a.recv_chunk().await;
    assert_eq!(chunk.data, b"first".to_vec());

    first.disconnect().await;
    a.reply(1, 1).await;
    assert!(a.recv_within(Duration::from_millis(100)).await.is_none());

    let mut second = pool.connect();
    second.request("second", 500, 505).await;
    let chunk = a.recv_chunk().await;
    assert_eq!(chunk, WorkRequest::new("second", 500, 505).unwrap());
    a.reply(8, 502).await;
    assert_eq!(second.recv_result().await, WorkResult { hash: 8, nonce: 502 });

    let sched = pool.shutdown().await;
    assert_eq!(sched.client_count(), 0);
}

/// Test 5: An orphan belonging to a departed client is dropped, not reissued
#[tokio::test]
async fn test_orphan_of_departed_client_not_reissued() {
    let pool = TestPool::start(config(10));

    let mut a = pool.connect();
    let mut client = pool.connect();
    a.join().await;
    client.request("block", 0, 100).await;
    a.recv_chunk().await;

    client.disconnect().await;
    a.disconnect().await;

    let mut b = pool.connect();
    b.join().await;
    assert!(b.recv_within(Duration::from_millis(100)).await.is_none());

    let sched = pool.shutdown().await;
    assert!(sched.backlog().is_empty());
}

/// Test 6: A silent miner is evicted after the assignment timeout and its chunk reissued
#[tokio::test]
async fn test_stalled_miner_evicted() {
    let mut cfg = config(10).with_assignment_timeout(100);
    cfg.reap_interval_ms = 20;
    let pool = TestPool::start(cfg);

    let mut silent = pool.connect();
    let mut client = pool.connect();
    let mut spare = pool.connect();
    silent.join().await;
    client.request("block", 0, 10).await;
    let chunk = silent.recv_chunk().await;
    spare.join().await;

    let reissued = tokio::time::timeout(Duration::from_secs(5), spare.recv_chunk())
        .await
        .expect("chunk should be reissued after the deadline");
    assert_eq!(reissued, chunk);

    // The evicted miner's connection is closed by the coordinator
    assert!(silent
        .recv_within(Duration::from_millis(200))
        .await
        .is_none());

    spare.reply(6, 6).await;
    assert_eq!(client.recv_result().await, WorkResult { hash: 6, nonce: 6 });
    pool.shutdown().await;
}

/// Test 7: An evicted miner that rejoins on the same connection is not given work again
#[tokio::test]
async fn test_evicted_miner_cannot_rejoin() {
    let mut cfg = config(10).with_assignment_timeout(100);
    cfg.reap_interval_ms = 20;
    let pool = TestPool::start(cfg);

    let mut silent = pool.connect();
    let silent_id = silent.conn.id();
    let mut client = pool.connect();
    silent.join().await;
    client.request("block", 0, 10).await;
    let chunk = silent.recv_chunk().await;

    // Returns once the coordinator has dropped the connection
    assert!(silent.recv_within(Duration::from_secs(5)).await.is_none());
    silent.join().await;

    let mut spare = pool.connect();
    spare.join().await;
    assert_eq!(spare.recv_chunk().await, chunk);

    spare.reply(4, 4).await;
    assert_eq!(client.recv_result().await, WorkResult { hash: 4, nonce: 4 });

    let sched = pool.shutdown().await;
    assert!(sched.peer(silent_id).is_none());
}

/// Test 8: Without an assignment timeout a silent miner keeps its chunk
#[tokio::test]
async fn test_no_timeout_keeps_silent_miner() {
    let pool = TestPool::start(config(10));

    let mut silent = pool.connect();
    let mut client = pool.connect();
    let mut spare = pool.connect();
    silent.join().await;
    client.request("block", 0, 10).await;
    silent.recv_chunk().await;
    spare.join().await;

    assert!(spare.recv_within(Duration::from_millis(300)).await.is_none());
    assert!(client.recv_within(Duration::from_millis(10)).await.is_none());

    silent.reply(2, 2).await;
    assert_eq!(client.recv_result().await, WorkResult { hash: 2, nonce: 2 });
    pool.shutdown().await;
}

/// Test 9: A redelivered result after completion is ignored and nothing is resent
#[tokio::test]
async fn test_duplicate_result_after_completion() {
    let pool = TestPool::start(config(10));

    let mut a = pool.connect();
    let a_id = a.conn.id();
    let mut client = pool.connect();
    a.join().await;
    client.request("block", 0, 10).await;
    a.recv_chunk().await;
    a.reply(3, 7).await;
    a.reply(3, 7).await;

    assert_eq!(client.recv_result().await, WorkResult { hash: 3, nonce: 7 });
    assert!(client
        .recv_within(Duration::from_millis(100))
        .await
        .is_none());
    assert!(a.recv_within(Duration::from_millis(10)).await.is_none());

    let sched = pool.shutdown().await;
    assert!(sched.is_idle_worker(a_id));
}

/// Test 10: A join from a connection that already submitted a request is ignored
#[tokio::test]
async fn test_client_cannot_become_miner() {
    let pool = TestPool::start(config(10));

    let mut client = pool.connect();
    client.request("block", 0, 10).await;
    client.join().await;
    assert!(client
        .recv_within(Duration::from_millis(100))
        .await
        .is_none());

    let mut a = pool.connect();
    a.join().await;
    a.recv_chunk().await;
    a.reply(1, 1).await;
    assert_eq!(
        client.recv().await,
        ProtocolMessage::WorkResult(WorkResult { hash: 1, nonce: 1 })
    );
    pool.shutdown().await;
}
