use std::ops::Range;

use crate::protocol::WorkRequest;

/// Carve the next chunk off `[lower, upper)`.
///
/// Returns `[lower, min(lower + chunk_size, upper))`. `chunk_size` must be at least 1.
pub fn next_chunk(lower: u64, upper: u64, chunk_size: u64) -> Range<u64> {
    debug_assert!(chunk_size >= 1, "chunk size must be at least 1");
    let end = lower.saturating_add(chunk_size).min(upper);
    lower..end
}

/// Undispatched portion of a client's request, plus in-flight bookkeeping.
#[derive(Debug, Clone)]
pub struct ClientWindow {
    data: Vec<u8>,
    start: u64,
    lower: u64,
    upper: u64,
    in_flight: usize,
}

impl ClientWindow {
    pub fn new(request: &WorkRequest) -> Self {
        Self {
            data: request.data.clone(),
            start: request.lower,
            lower: request.lower,
            upper: request.upper,
            in_flight: 0,
        }
    }

    /// Carve the next chunk and advance `lower` past it.
    ///
    /// The chunk is counted as in flight until [`ClientWindow::complete_chunk`].
    /// Returns `None` once the whole range has been dispatched.
    pub fn carve(&mut self, chunk_size: u64) -> Option<WorkRequest> {
        if !self.has_remaining() {
            return None;
        }
        let chunk = next_chunk(self.lower, self.upper, chunk_size);
        self.lower = chunk.end;
        self.in_flight += 1;
        Some(WorkRequest {
            data: self.data.clone(),
            lower: chunk.start,
            upper: chunk.end,
        })
    }

    pub fn complete_chunk(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    /// True while some of the range has not been handed to a miner yet
    pub fn has_remaining(&self) -> bool {
        self.lower < self.upper
    }

    /// Every chunk has been dispatched and answered
    pub fn is_complete(&self) -> bool {
        !self.has_remaining() && self.in_flight == 0
    }

    /// The originally requested range
    pub fn range(&self) -> Range<u64> {
        self.start..self.upper
    }

    pub fn lower(&self) -> u64 {
        self.lower
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }
}
