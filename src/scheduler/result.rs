use crate::protocol::WorkResult;

/// Running minimum over every chunk completed for one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BestResult {
    pub hash: u64,
    pub nonce: u64,
}

impl Default for BestResult {
    fn default() -> Self {
        Self::new()
    }
}

impl BestResult {
    /// Starts at the maximum value so any real result replaces it
    pub fn new() -> Self {
        Self {
            hash: u64::MAX,
            nonce: u64::MAX,
        }
    }

    /// Keep `result` if its hash is strictly smaller. Returns true if it was kept.
    pub fn offer(&mut self, result: WorkResult) -> bool {
        if result.hash < self.hash {
            self.hash = result.hash;
            self.nonce = result.nonce;
            true
        } else {
            false
        }
    }

    pub fn to_result(self) -> WorkResult {
        WorkResult {
            hash: self.hash,
            nonce: self.nonce,
        }
    }
}
