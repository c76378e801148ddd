use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::protocol::WorkRequest;
use crate::transport::ConnId;

/// One chunk of a client's range, assigned to exactly one miner.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    /// Connection of the client that owns the range
    pub client: ConnId,
    /// The chunk as sent to the miner; resent unchanged on reassignment
    pub chunk: WorkRequest,
}

impl Job {
    pub fn new(client: ConnId, chunk: WorkRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            client,
            chunk,
        }
    }

    pub fn upper(&self) -> u64 {
        self.chunk.upper
    }
}

/// Assignment state of a connected miner. Holds at most one job.
#[derive(Debug, Clone, Default)]
pub struct WorkerSlot {
    job: Option<Job>,
    assigned_at: Option<Instant>,
}

impl WorkerSlot {
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn is_idle(&self) -> bool {
        self.job.is_none()
    }

    pub fn job(&self) -> Option<&Job> {
        self.job.as_ref()
    }

    /// Bind a job to an idle slot. Hands the job back if the slot is busy.
    pub fn assign(&mut self, job: Job) -> Result<(), Job> {
        if self.job.is_some() {
            return Err(job);
        }
        self.job = Some(job);
        self.assigned_at = Some(Instant::now());
        Ok(())
    }

    /// Free the slot, returning the job it held
    pub fn release(&mut self) -> Option<Job> {
        self.assigned_at = None;
        self.job.take()
    }

    /// True if the current job has been outstanding for at least `timeout` at `now`
    pub fn is_stalled(&self, now: Instant, timeout: Duration) -> bool {
        match self.assigned_at {
            Some(at) => now.saturating_duration_since(at) >= timeout,
            None => false,
        }
    }
}
