pub mod client;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod protocol;
pub mod scheduler;
pub mod shutdown;
pub mod transport;
pub mod worker;

// Re-export generated protobuf types
pub mod proto {
    tonic::include_proto!("miner");
}
