//! Client for the SPIFFE Workload API over a local Unix domain socket.
//!
//! A workload bootstraps its identity by asking the local agent
//! (typically a SPIRE agent) for X.509 and JWT SVIDs and for the trust
//! bundles needed to verify peers. This crate speaks the Workload API
//! directly: gRPC over prior-knowledge cleartext HTTP/2 on the agent's
//! Unix socket, with no TLS and no TCP.
//!
//! This is a fetch client. Certificates and tokens are returned as the
//! agent sent them; verifying them is the caller's job.
//!
//! ```no_run
//! use std::time::Duration;
//! use spiffe_workload_api::{CancellationToken, Status, WorkloadApiClient};
//!
//! # async fn demo() {
//! let client = WorkloadApiClient::new(spiffe_workload_api::DEFAULT_AGENT_SOCKET_PATH);
//!
//! let svids = client
//!     .fetch_jwt_svid(&["audience".to_owned()], None, Duration::from_secs(5))
//!     .await;
//!
//! let cancel = CancellationToken::new();
//! let final_status = client
//!     .fetch_x509_svid(
//!         |context| {
//!             println!("default identity: {}", context.svids[0].spiffe_id);
//!             Status::ok()
//!         },
//!         &cancel,
//!     )
//!     .await;
//! # }
//! ```

mod client;
mod der;
mod framing;
mod grpc;
mod proto;
mod status;
mod types;

pub use client::{WorkloadApiClient, DEFAULT_AGENT_SOCKET_PATH};
pub use status::{code, Status};
pub use types::{
    JwtBundles, JwtSvid, TrustDomain, X509BundlesContext, X509Svid, X509SvidContext,
};

// Re-exported so callers share the crate's token type without pinning
// their own tokio-util version.
pub use tokio_util::sync::CancellationToken;
