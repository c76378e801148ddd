pub mod assigner;
pub mod job;
pub mod queue;
pub mod result;
pub mod window;

pub use assigner::{Outbound, Peer, Scheduler};
pub use job::{Job, WorkerSlot};
pub use queue::{Backlog, PendingClients};
pub use result::BestResult;
pub use window::{next_chunk, ClientWindow};
