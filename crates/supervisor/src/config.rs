//! CLI flags for the supervisor binary (C10). Every flag has an env var
//! fallback (`clap`'s `env` feature) so the process can be configured the
//! same way whether launched directly or under a process supervisor.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

/// The log-stream supervisor: mediates between ingest-side workers and
/// operator tooling over the filter manager core.
#[derive(Debug, Parser)]
#[command(name = "lsd-supervisor", version)]
pub struct Args {
    /// Address to bind the HTTP server on.
    #[arg(long, env = "LSD_BIND", default_value = "0.0.0.0:1525")]
    pub bind: SocketAddr,

    /// Path to the embedded KV database file.
    #[arg(long, env = "LSD_DB_FILE", default_value = "lsd.redb")]
    pub db_file: PathBuf,

    /// Per-filter result ring capacity (`M`): how many recent matched
    /// lines are kept in memory before the oldest are evicted.
    #[arg(long, env = "LSD_MAX_MSG_MEMORY", default_value_t = 10_000)]
    pub max_msg_memory: usize,

    /// Depth of the background persister's job queue.
    #[arg(long, env = "LSD_PERSIST_QUEUE_DEPTH", default_value_t = 1_024)]
    pub persist_queue_depth: usize,
}
