use clap::{Parser, ValueEnum};
use serde::Serialize;
use std::net::SocketAddr;
use tracing_subscriber::EnvFilter;

use minepool::client;
use minepool::config::{CoordinatorConfig, MinerConfig, DEFAULT_CHUNK_SIZE};
use minepool::coordinator::Coordinator;
use minepool::protocol::WorkRequest;
use minepool::shutdown::install_shutdown_handler;
use minepool::transport::{GrpcConnection, GrpcTransport};
use minepool::worker::Miner;

#[derive(Parser, Debug)]
#[command(name = "minepool")]
#[command(version)]
#[command(about = "A fault-tolerant pool that splits proof-of-work searches across miners")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the coordinator
    Server(ServerArgs),

    /// Join a coordinator as a miner
    Miner(MinerArgs),

    /// Submit a search and wait for the result
    Client(ClientArgs),
}

// =============================================================================
// Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ServerArgs {
    /// Port to listen on
    #[arg(long, default_value = "50061")]
    port: u16,

    /// Maximum number of nonces handed to one miner at a time
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: u64,

    /// Reassign a chunk if its miner has not answered within this many milliseconds.
    /// Without it a silent miner keeps its chunk until it disconnects.
    #[arg(long)]
    assignment_timeout_ms: Option<u64>,
}

#[derive(Parser, Debug)]
struct MinerArgs {
    /// Coordinator address
    #[arg(long, short = 'a', default_value = "127.0.0.1:50061")]
    addr: String,
}

#[derive(Parser, Debug)]
struct ClientArgs {
    /// Coordinator address
    #[arg(long, short = 'a', default_value = "127.0.0.1:50061")]
    addr: String,

    /// Data to search over
    message: String,

    /// Exclusive upper bound of the nonce range (pass max+1 to include max)
    max_nonce: u64,

    /// Inclusive lower bound of the nonce range
    #[arg(long, default_value = "0")]
    lower: u64,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Serialize)]
struct SearchOutput {
    message: String,
    lower: u64,
    upper: u64,
    hash: u64,
    nonce: u64,
}

// =============================================================================
// Commands
// =============================================================================

async fn run_server(args: ServerArgs) -> Result<(), Box<dyn std::error::Error>> {
    let listen_addr: SocketAddr = format!("0.0.0.0:{}", args.port).parse()?;
    let mut config = CoordinatorConfig::new(listen_addr).with_chunk_size(args.chunk_size);
    config.assignment_timeout_ms = args.assignment_timeout_ms;
    config.validate()?;

    tracing::info!(
        listen_addr = %config.listen_addr,
        chunk_size = config.chunk_size,
        assignment_timeout_ms = ?config.assignment_timeout_ms,
        "Starting minepool coordinator"
    );

    let shutdown = install_shutdown_handler("coordinator")?;
    let transport = GrpcTransport::bind(config.listen_addr, config.inbound_capacity).await?;
    let coordinator = Coordinator::new(config, transport)?;
    coordinator.run(shutdown).await?;
    Ok(())
}

async fn run_miner(args: MinerArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = MinerConfig {
        server_addr: args.addr,
    };
    tracing::info!(server_addr = %config.server_addr, "Starting miner");

    let shutdown = install_shutdown_handler("miner")?;
    let mut conn = GrpcConnection::connect(&config.server_addr).await?;
    let completed = Miner::new().run(&mut conn, shutdown).await?;
    tracing::info!(completed, "Miner stopped");
    Ok(())
}

async fn run_client(args: ClientArgs) -> Result<(), Box<dyn std::error::Error>> {
    let request = WorkRequest::new(args.message.as_bytes(), args.lower, args.max_nonce)?;
    let mut conn = GrpcConnection::connect(&args.addr).await?;
    let result = client::search(&mut conn, request).await?;

    match args.output {
        OutputFormat::Json => {
            let output = SearchOutput {
                message: args.message,
                lower: args.lower,
                upper: args.max_nonce,
                hash: result.hash,
                nonce: result.nonce,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => {
            println!("MinHash={} Nonce={}", result.hash, result.nonce);
        }
    }
    Ok(())
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Commands::Server(server_args) => run_server(server_args).await?,
        Commands::Miner(miner_args) => run_miner(miner_args).await?,
        Commands::Client(client_args) => run_client(client_args).await?,
    }

    Ok(())
}
