//! The Workload API operations.

use std::path::PathBuf;
use std::time::Duration;

use prost::Message;
use tokio_util::sync::CancellationToken;

use crate::der;
use crate::grpc::{GrpcClient, GrpcMetadata, GrpcResponse, GrpcResult, GrpcStatus};
use crate::proto;
use crate::status::{code, Status};
use crate::types::{JwtBundles, JwtSvid, X509BundlesContext, X509Svid, X509SvidContext};

/// Where a SPIRE agent exposes the Workload API by default.
pub const DEFAULT_AGENT_SOCKET_PATH: &str = "/tmp/spire-agent/public/api.sock";

const SERVICE: &str = "SpiffeWorkloadAPI";

const DECODE_FAILED: &str = "decode gRPC response failed";

/// The Workload API requires this header on every call and rejects
/// callers that omit it.
fn spiffe_metadata() -> Vec<GrpcMetadata> {
    vec![GrpcMetadata {
        key: "workload.spiffe.io".to_owned(),
        value: "true".to_owned(),
    }]
}

/// Client for the SPIFFE Workload API served on a local Unix socket.
///
/// Streaming fetches hold their connection open until the server
/// closes the stream, the callback returns non-OK, or the
/// cancellation token fires; the agent re-sends the current material
/// on each rotation, so callbacks run for the lifetime of the call.
/// Every call dials its own connection, so one client may serve any
/// number of concurrent calls, and one cancellation token may be
/// shared between them to stop them all at once.
pub struct WorkloadApiClient {
    socket_path: PathBuf,
}

impl WorkloadApiClient {
    /// Creates a client for the agent socket at `socket_path`. No
    /// connection is made until an operation runs.
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    /// Streams X.509 SVID updates, invoking `on_update` for each one.
    ///
    /// Only returns when the stream ends: the final status is OK on
    /// server completion, the callback's own status if it returned
    /// non-OK, or CANCELLED after `cancel` fires.
    pub async fn fetch_x509_svid<F>(&self, mut on_update: F, cancel: &CancellationToken) -> Status
    where
        F: FnMut(X509SvidContext) -> Status,
    {
        let request = proto::X509svidRequest::default().encode_to_vec();
        GrpcClient::new(&self.socket_path)
            .call_stream(
                SERVICE,
                "FetchX509SVID",
                &request,
                |response: GrpcResponse| {
                    let decoded = match proto::X509svidResponse::decode(response.data.as_ref()) {
                        Ok(decoded) => decoded,
                        Err(_) => return GrpcStatus::internal(DECODE_FAILED),
                    };
                    on_update(x509_svid_context(decoded)).into()
                },
                &spiffe_metadata(),
                cancel,
            )
            .await
            .into()
    }

    /// Streams X.509 trust bundle updates for the local and federated
    /// trust domains.
    pub async fn fetch_x509_bundles<F>(
        &self,
        mut on_update: F,
        cancel: &CancellationToken,
    ) -> Status
    where
        F: FnMut(X509BundlesContext) -> Status,
    {
        let request = proto::X509BundlesRequest::default().encode_to_vec();
        GrpcClient::new(&self.socket_path)
            .call_stream(
                SERVICE,
                "FetchX509Bundles",
                &request,
                |response: GrpcResponse| {
                    let decoded = match proto::X509BundlesResponse::decode(response.data.as_ref())
                    {
                        Ok(decoded) => decoded,
                        Err(_) => return GrpcStatus::internal(DECODE_FAILED),
                    };
                    on_update(x509_bundles_context(decoded)).into()
                },
                &spiffe_metadata(),
                cancel,
            )
            .await
            .into()
    }

    /// Streams JWT trust bundle (JWKS) updates.
    pub async fn fetch_jwt_bundles<F>(&self, mut on_update: F, cancel: &CancellationToken) -> Status
    where
        F: FnMut(JwtBundles) -> Status,
    {
        let request = proto::JwtBundlesRequest::default().encode_to_vec();
        GrpcClient::new(&self.socket_path)
            .call_stream(
                SERVICE,
                "FetchJWTBundles",
                &request,
                |response: GrpcResponse| {
                    let decoded = match proto::JwtBundlesResponse::decode(response.data.as_ref()) {
                        Ok(decoded) => decoded,
                        Err(_) => return GrpcStatus::internal(DECODE_FAILED),
                    };
                    on_update(JwtBundles {
                        bundles: decoded.bundles,
                    })
                    .into()
                },
                &spiffe_metadata(),
                cancel,
            )
            .await
            .into()
    }

    /// Fetches JWT SVIDs for `audience`, in server order (the first is
    /// the default identity). `spiffe_id` restricts the response to
    /// one identity; `timeout` bounds the whole call.
    ///
    /// The audience list is forwarded as given; the agent rejects an
    /// empty one.
    pub async fn fetch_jwt_svid(
        &self,
        audience: &[String],
        spiffe_id: Option<&str>,
        timeout: Duration,
    ) -> Result<Vec<JwtSvid>, Status> {
        let request = proto::JwtsvidRequest {
            audience: audience.to_vec(),
            spiffe_id: spiffe_id.unwrap_or_default().to_owned(),
        }
        .encode_to_vec();

        let result = GrpcClient::new(&self.socket_path)
            .call(SERVICE, "FetchJWTSVID", &request, &spiffe_metadata(), timeout)
            .await;

        match result {
            GrpcResult::Response(response) => {
                let decoded = proto::JwtsvidResponse::decode(response.data.as_ref())
                    .map_err(|_| Status::new(code::INTERNAL, DECODE_FAILED))?;
                Ok(decoded
                    .svids
                    .into_iter()
                    .map(|svid| JwtSvid {
                        spiffe_id: svid.spiffe_id,
                        svid: svid.svid,
                        hint: svid.hint,
                    })
                    .collect())
            }
            GrpcResult::Status(status) => Err(status.into()),
        }
    }
}

fn x509_svid_context(decoded: proto::X509svidResponse) -> X509SvidContext {
    X509SvidContext {
        svids: decoded
            .svids
            .into_iter()
            .map(|svid| X509Svid {
                spiffe_id: svid.spiffe_id,
                chain: der::split_certificates(&svid.x509_svid),
                private_key: svid.x509_svid_key,
                bundle: der::split_certificates(&svid.bundle),
                hint: svid.hint,
            })
            .collect(),
        crl: decoded.crl,
        federated_bundles: decoded
            .federated_bundles
            .into_iter()
            .map(|(trust_domain, der)| (trust_domain, der::split_certificates(&der)))
            .collect(),
    }
}

fn x509_bundles_context(decoded: proto::X509BundlesResponse) -> X509BundlesContext {
    X509BundlesContext {
        crl: decoded.crl,
        bundles: decoded
            .bundles
            .into_iter()
            .map(|(trust_domain, der)| (trust_domain, der::split_certificates(&der)))
            .collect(),
    }
}
