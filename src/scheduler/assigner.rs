use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use crate::protocol::{ProtocolMessage, WorkRequest, WorkResult};
use crate::scheduler::job::{Job, WorkerSlot};
use crate::scheduler::queue::{Backlog, PendingClients};
use crate::scheduler::result::BestResult;
use crate::scheduler::window::ClientWindow;
use crate::transport::ConnId;

/// Role of a connection, fixed by the first message it sends
#[derive(Debug, Clone)]
pub enum Peer {
    Worker(WorkerSlot),
    Client,
}

/// A message the scheduler wants written to a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub conn: ConnId,
    pub message: ProtocolMessage,
}

/// Scheduling state for all connected miners and clients.
///
/// Every handler runs to completion on `&mut self` and returns the messages
/// to send, so callers must feed events one at a time and in arrival order.
///
/// # Invariants
///
/// - A miner holds at most one [`Job`].
/// - Every client in the pending queue has a window with undispatched range.
/// - Orphaned jobs are reissued from the backlog before any fresh chunk is carved.
/// - A client is answered exactly once, when its window has been fully dispatched
///   and every dispatched chunk (including ones sitting in the backlog) has a result.
#[derive(Debug)]
pub struct Scheduler {
    chunk_size: u64,
    peers: BTreeMap<ConnId, Peer>,
    windows: HashMap<ConnId, ClientWindow>,
    results: HashMap<ConnId, BestResult>,
    pending: PendingClients,
    backlog: Backlog,
    outbox: Vec<Outbound>,
}

impl Scheduler {
    pub fn new(chunk_size: u64) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            peers: BTreeMap::new(),
            windows: HashMap::new(),
            results: HashMap::new(),
            pending: PendingClients::new(),
            backlog: Backlog::new(),
            outbox: Vec::new(),
        }
    }

    /// Apply one inbound message from `conn`
    pub fn handle(&mut self, conn: ConnId, message: ProtocolMessage) -> Vec<Outbound> {
        match message {
            ProtocolMessage::Join => self.handle_join(conn),
            ProtocolMessage::WorkRequest(request) => self.handle_work_request(conn, request),
            ProtocolMessage::WorkResult(result) => self.handle_work_result(conn, result),
        }
        std::mem::take(&mut self.outbox)
    }

    /// Clean up after `conn` dropped, requeueing whatever a miner was working on
    pub fn handle_disconnect(&mut self, conn: ConnId) -> Vec<Outbound> {
        match self.peers.remove(&conn) {
            None => {
                tracing::debug!(conn = %conn, "Unregistered connection dropped");
            }
            Some(Peer::Worker(mut slot)) => {
                tracing::info!(conn = %conn, "Miner disconnected");
                if let Some(job) = slot.release() {
                    self.orphan(job);
                }
                self.drain_backlog();
            }
            Some(Peer::Client) => {
                self.windows.remove(&conn);
                self.results.remove(&conn);
                self.pending.remove(conn);
                let purged = self.backlog.purge_client(conn);
                tracing::info!(conn = %conn, purged, "Client disconnected, request abandoned");
            }
        }
        std::mem::take(&mut self.outbox)
    }

    /// Evict miners whose job has been outstanding for `timeout` or longer.
    ///
    /// Their jobs go back on the backlog as if they had disconnected. Returns the
    /// evicted connections together with the messages to send.
    pub fn reap_stalled(&mut self, now: Instant, timeout: Duration) -> (Vec<ConnId>, Vec<Outbound>) {
        let stalled: Vec<ConnId> = self
            .peers
            .iter()
            .filter_map(|(&conn, peer)| match peer {
                Peer::Worker(slot) if slot.is_stalled(now, timeout) => Some(conn),
                _ => None,
            })
            .collect();

        for &conn in &stalled {
            if let Some(Peer::Worker(mut slot)) = self.peers.remove(&conn) {
                tracing::warn!(
                    conn = %conn,
                    timeout_ms = timeout.as_millis() as u64,
                    "Miner missed its assignment deadline, evicting"
                );
                if let Some(job) = slot.release() {
                    self.orphan(job);
                }
            }
        }
        if !stalled.is_empty() {
            self.drain_backlog();
        }

        (stalled, std::mem::take(&mut self.outbox))
    }

    fn handle_join(&mut self, conn: ConnId) {
        match self.peers.get(&conn) {
            None => {
                self.peers.insert(conn, Peer::Worker(WorkerSlot::idle()));
                tracing::info!(conn = %conn, "Miner joined");
                self.distribute_job(conn);
            }
            Some(Peer::Worker(_)) => {
                tracing::debug!(conn = %conn, "Duplicate join ignored");
            }
            Some(Peer::Client) => {
                tracing::warn!(conn = %conn, "Join from a client connection ignored");
            }
        }
    }

    fn handle_work_request(&mut self, conn: ConnId, request: WorkRequest) {
        if request.is_empty() {
            tracing::warn!(conn = %conn, lower = request.lower, upper = request.upper, "Empty work request ignored");
            return;
        }
        match self.peers.get(&conn) {
            None => {}
            Some(Peer::Worker(_)) => {
                tracing::warn!(conn = %conn, "Work request from a miner connection ignored");
                return;
            }
            Some(Peer::Client) => {
                tracing::warn!(conn = %conn, "Client already has a request in progress, ignored");
                return;
            }
        }

        tracing::info!(
            conn = %conn,
            lower = request.lower,
            upper = request.upper,
            "Client request accepted"
        );
        self.peers.insert(conn, Peer::Client);
        self.windows.insert(conn, ClientWindow::new(&request));
        self.results.insert(conn, BestResult::new());
        self.pending.push(conn);

        for worker in self.idle_workers() {
            self.distribute_job(worker);
        }
    }

    fn handle_work_result(&mut self, conn: ConnId, result: WorkResult) {
        let job = match self.peers.get_mut(&conn) {
            Some(Peer::Worker(slot)) => match slot.release() {
                Some(job) => job,
                None => {
                    tracing::warn!(conn = %conn, "Result from a miner with no assigned job discarded");
                    return;
                }
            },
            Some(Peer::Client) | None => {
                tracing::warn!(conn = %conn, "Result from a non-miner connection discarded");
                return;
            }
        };

        // Keep the miner busy before doing any bookkeeping
        self.distribute_job(conn);
        self.aggregate(job, result);
    }

    fn aggregate(&mut self, job: Job, result: WorkResult) {
        let client = job.client;
        let Some(window) = self.windows.get_mut(&client) else {
            tracing::debug!(job_id = %job.id, client = %client, "Result for a departed client discarded");
            return;
        };
        window.complete_chunk();
        let complete = window.is_complete();

        if let Some(best) = self.results.get_mut(&client) {
            if best.offer(result) {
                tracing::debug!(client = %client, hash = result.hash, nonce = result.nonce, "New best result");
            }
        }
        tracing::debug!(
            job_id = %job.id,
            client = %client,
            lower = job.chunk.lower,
            upper = job.upper(),
            "Chunk completed"
        );

        if complete {
            let best = self.results.remove(&client).unwrap_or_default();
            self.windows.remove(&client);
            self.peers.remove(&client);
            tracing::info!(client = %client, hash = best.hash, nonce = best.nonce, "Client request complete");
            self.outbox.push(Outbound {
                conn: client,
                message: ProtocolMessage::WorkResult(best.to_result()),
            });
        }
    }

    /// Give `worker` one unit of work if it is idle: backlog first, then a fresh chunk.
    fn distribute_job(&mut self, worker: ConnId) {
        let Some(Peer::Worker(slot)) = self.peers.get_mut(&worker) else {
            return;
        };
        if !slot.is_idle() {
            return;
        }

        if let Some(job) = self.backlog.pop() {
            tracing::info!(job_id = %job.id, worker = %worker, client = %job.client, "Reissuing orphaned chunk");
            self.outbox.push(Outbound {
                conn: worker,
                message: ProtocolMessage::WorkRequest(job.chunk.clone()),
            });
            if let Err(job) = slot.assign(job) {
                self.backlog.push(job);
            }
            return;
        }

        while let Some(client) = self.pending.front() {
            let Some(window) = self.windows.get_mut(&client) else {
                self.pending.pop_front();
                continue;
            };
            let Some(chunk) = window.carve(self.chunk_size) else {
                self.pending.pop_front();
                continue;
            };
            if window.has_remaining() {
                self.pending.rotate();
            } else {
                self.pending.pop_front();
            }

            let job = Job::new(client, chunk);
            tracing::debug!(
                job_id = %job.id,
                worker = %worker,
                client = %client,
                lower = job.chunk.lower,
                upper = job.chunk.upper,
                "Chunk assigned"
            );
            self.outbox.push(Outbound {
                conn: worker,
                message: ProtocolMessage::WorkRequest(job.chunk.clone()),
            });
            if let Err(job) = slot.assign(job) {
                self.backlog.push(job);
            }
            return;
        }
    }

    fn orphan(&mut self, job: Job) {
        if self.windows.contains_key(&job.client) {
            tracing::info!(job_id = %job.id, client = %job.client, "Chunk orphaned, queued for reassignment");
            self.backlog.push(job);
        }
    }

    /// Offer backlog jobs to idle miners
    fn drain_backlog(&mut self) {
        for worker in self.idle_workers() {
            if self.backlog.is_empty() {
                break;
            }
            self.distribute_job(worker);
        }
    }

    fn idle_workers(&self) -> Vec<ConnId> {
        self.peers
            .iter()
            .filter_map(|(&conn, peer)| match peer {
                Peer::Worker(slot) if slot.is_idle() => Some(conn),
                _ => None,
            })
            .collect()
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn peer(&self, conn: ConnId) -> Option<&Peer> {
        self.peers.get(&conn)
    }

    /// Job currently held by a miner
    pub fn worker_job(&self, conn: ConnId) -> Option<&Job> {
        match self.peers.get(&conn) {
            Some(Peer::Worker(slot)) => slot.job(),
            _ => None,
        }
    }

    pub fn is_idle_worker(&self, conn: ConnId) -> bool {
        matches!(self.peers.get(&conn), Some(Peer::Worker(slot)) if slot.is_idle())
    }

    pub fn worker_count(&self) -> usize {
        self.peers
            .values()
            .filter(|p| matches!(p, Peer::Worker(_)))
            .count()
    }

    /// Clients with a request still in progress
    pub fn client_count(&self) -> usize {
        self.windows.len()
    }

    pub fn window(&self, client: ConnId) -> Option<&ClientWindow> {
        self.windows.get(&client)
    }

    pub fn best_result(&self, client: ConnId) -> Option<&BestResult> {
        self.results.get(&client)
    }

    pub fn pending_clients(&self) -> Vec<ConnId> {
        self.pending.iter().collect()
    }

    pub fn backlog(&self) -> &Backlog {
        &self.backlog
    }
}
