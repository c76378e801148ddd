use std::collections::VecDeque;

use crate::scheduler::job::Job;
use crate::transport::ConnId;

/// Round-robin order of clients that still have undispatched range.
#[derive(Debug, Default)]
pub struct PendingClients {
    order: VecDeque<ConnId>,
}

impl PendingClients {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a client at the back of service order
    pub fn push(&mut self, client: ConnId) {
        if !self.order.contains(&client) {
            self.order.push_back(client);
        }
    }

    /// Client due for the next chunk
    pub fn front(&self) -> Option<ConnId> {
        self.order.front().copied()
    }

    /// Move the client at the front to the back of service order
    pub fn rotate(&mut self) {
        if let Some(client) = self.order.pop_front() {
            self.order.push_back(client);
        }
    }

    pub fn pop_front(&mut self) -> Option<ConnId> {
        self.order.pop_front()
    }

    /// Remove a client wherever it sits. Returns true if it was queued.
    pub fn remove(&mut self, client: ConnId) -> bool {
        match self.order.iter().position(|&c| c == client) {
            Some(pos) => {
                self.order.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = ConnId> + '_ {
        self.order.iter().copied()
    }
}

/// Jobs orphaned by a departed miner. The most recently orphaned job is reissued first.
#[derive(Debug, Default)]
pub struct Backlog {
    jobs: Vec<Job>,
}

impl Backlog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, job: Job) {
        self.jobs.push(job);
    }

    pub fn pop(&mut self) -> Option<Job> {
        self.jobs.pop()
    }

    /// Drop every job owned by `client`. Returns how many were removed.
    pub fn purge_client(&mut self, client: ConnId) -> usize {
        let before = self.jobs.len();
        self.jobs.retain(|job| job.client != client);
        before - self.jobs.len()
    }

    pub fn jobs_for_client(&self, client: ConnId) -> Vec<&Job> {
        self.jobs.iter().filter(|j| j.client == client).collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
