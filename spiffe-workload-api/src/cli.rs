use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Fetch SVIDs and trust bundles from a SPIFFE Workload API agent.
#[derive(Parser, Debug)]
#[command(name = "spiffe-workload-api")]
#[command(about = "Fetch SVIDs and trust bundles from a SPIFFE Workload API agent", long_about = None)]
pub struct Args {
    /// Path to the agent's Unix domain socket
    #[arg(
        short,
        long,
        default_value = spiffe_workload_api::DEFAULT_AGENT_SOCKET_PATH
    )]
    pub socket_path: PathBuf,

    /// Audience for the JWT-SVID fetch; repeat for multiple audiences
    #[arg(long, default_value = "spiffe-workload-api-demo")]
    pub audience: Vec<String>,

    /// Restrict the JWT-SVID fetch to this SPIFFE ID
    #[arg(long)]
    pub spiffe_id: Option<String>,

    /// Timeout in milliseconds for the JWT-SVID fetch
    #[arg(long, default_value_t = 5000)]
    pub timeout_ms: u64,

    /// How long to watch the streaming fetches before cancelling them
    #[arg(long, default_value_t = 2)]
    pub watch_seconds: u64,
}

impl Args {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn watch_duration(&self) -> Duration {
        Duration::from_secs(self.watch_seconds)
    }
}
