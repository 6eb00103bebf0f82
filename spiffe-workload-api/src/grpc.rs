//! gRPC over cleartext HTTP/2 on a Unix domain socket.
//!
//! The agent endpoint is a filesystem path, not a network authority,
//! so requests are synthesized against the placeholder URL
//! `http://-/<Service>/<Method>` and the socket is dialed out of band.
//! HTTP/2 runs in prior-knowledge mode (the `h2` crate has no
//! HTTP/1.1 upgrade path, so this is structural).
//!
//! A `GrpcClient` dials a fresh connection per call; a connection
//! never carries more than one call.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use h2::client::SendRequest;
use http::{HeaderMap, Method, Request, StatusCode};
use percent_encoding::percent_decode_str;
use thiserror::Error;
use tokio::net::UnixStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::framing::{self, FramePeek};
use crate::status::{code, Status};

const UNPACK_FAILED: &str = "Failed to unpack gRPC message";

/// One request-metadata entry, sent verbatim as an HTTP/2 header.
#[derive(Debug, Clone)]
pub(crate) struct GrpcMetadata {
    pub key: String,
    pub value: String,
}

/// Payload of a single response message.
#[derive(Debug)]
pub(crate) struct GrpcResponse {
    pub data: Bytes,
}

/// Terminal status of a call, from the transport or the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct GrpcStatus {
    pub code: i32,
    pub message: String,
}

impl GrpcStatus {
    pub fn ok() -> Self {
        Self {
            code: code::OK,
            message: String::new(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            code: code::INTERNAL,
            message: message.into(),
        }
    }

    pub fn cancelled() -> Self {
        Self {
            code: code::CANCELLED,
            message: "user canceled".to_owned(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == code::OK
    }
}

impl From<GrpcStatus> for Status {
    fn from(status: GrpcStatus) -> Self {
        Self {
            code: status.code,
            message: status.message,
        }
    }
}

impl From<Status> for GrpcStatus {
    fn from(status: Status) -> Self {
        Self {
            code: status.code,
            message: status.message,
        }
    }
}

/// Outcome of a unary call: exactly one of a response payload or a
/// non-OK status.
#[derive(Debug)]
pub(crate) enum GrpcResult {
    Response(GrpcResponse),
    Status(GrpcStatus),
}

/// Transport-level failures, all surfaced to callers as INTERNAL with
/// the underlying message.
#[derive(Debug, Error)]
enum TransportError {
    #[error("failed to connect to agent socket: {0}")]
    Connect(#[source] io::Error),

    #[error("{0}")]
    Http2(#[from] h2::Error),

    #[error("invalid request: {0}")]
    Request(#[from] http::Error),
}

impl From<TransportError> for GrpcStatus {
    fn from(err: TransportError) -> Self {
        Self::internal(err.to_string())
    }
}

/// A gRPC endpoint bound to a Unix socket path.
pub(crate) struct GrpcClient {
    socket_path: PathBuf,
}

impl GrpcClient {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    /// Dials the socket and performs the HTTP/2 handshake. The
    /// connection driver is spawned off; it exits once the call's
    /// stream is done.
    async fn connect(&self) -> Result<SendRequest<Bytes>, TransportError> {
        let stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(TransportError::Connect)?;
        let (sender, connection) = h2::client::handshake(stream).await?;
        debug!(socket = %self.socket_path.display(), "connected to agent");
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                debug!(%err, "h2 connection terminated");
            }
        });
        Ok(sender)
    }

    fn build_request(
        &self,
        service: &str,
        method: &str,
        metadata: &[GrpcMetadata],
    ) -> Result<Request<()>, TransportError> {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(format!("http://-/{service}/{method}"))
            .header("content-type", "application/grpc+proto")
            .header("te", "trailers")
            .header("grpc-accept-encoding", "identity");
        for entry in metadata {
            builder = builder.header(entry.key.as_str(), entry.value.as_str());
        }
        Ok(builder.body(())?)
    }

    /// Performs a unary call: one framed request out, one framed
    /// message back. `timeout` bounds the whole call.
    pub async fn call(
        &self,
        service: &str,
        method: &str,
        request_data: &[u8],
        metadata: &[GrpcMetadata],
        timeout: Duration,
    ) -> GrpcResult {
        let framed = match framing::pack(request_data) {
            Ok(framed) => framed,
            Err(err) => return GrpcResult::Status(GrpcStatus::internal(err.to_string())),
        };
        match tokio::time::timeout(timeout, self.call_inner(service, method, framed, metadata))
            .await
        {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => GrpcResult::Status(err.into()),
            Err(elapsed) => GrpcResult::Status(GrpcStatus::internal(elapsed.to_string())),
        }
    }

    async fn call_inner(
        &self,
        service: &str,
        method: &str,
        framed: Bytes,
        metadata: &[GrpcMetadata],
    ) -> Result<GrpcResult, TransportError> {
        let request = self.build_request(service, method, metadata)?;
        let mut sender = self.connect().await?.ready().await?;
        let (response, mut request_body) = sender.send_request(request, false)?;
        request_body.send_data(framed, true)?;

        let (head, mut body) = response.await?.into_parts();
        let mut data = BytesMut::new();
        while let Some(chunk) = body.data().await {
            let chunk = chunk?;
            let _ = body.flow_control().release_capacity(chunk.len());
            data.extend_from_slice(&chunk);
        }
        let trailers = body.trailers().await?;

        if head.status != StatusCode::OK {
            return Ok(GrpcResult::Status(GrpcStatus::internal(format!(
                "HTTP error: {}",
                head.status.as_u16()
            ))));
        }

        let status = extract_grpc_status(&head.headers, trailers.as_ref());
        if !status.is_ok() {
            return Ok(GrpcResult::Status(status));
        }

        let data = data.freeze();
        match framing::unpack(&data) {
            Ok(payload) => Ok(GrpcResult::Response(GrpcResponse {
                data: data.slice_ref(payload),
            })),
            Err(_) => Ok(GrpcResult::Status(GrpcStatus::internal(UNPACK_FAILED))),
        }
    }

    /// Performs a server-streaming call, handing each framed message
    /// to `on_response` in arrival order.
    ///
    /// Returns when the server completes the stream, the callback
    /// returns non-OK, unpacking fails, or `cancel` fires. When
    /// several of those happen together the callback's status wins,
    /// then the unpack error, then cancellation, then transport and
    /// HTTP failures, and only then the server's trailer status.
    pub async fn call_stream<F>(
        &self,
        service: &str,
        method: &str,
        request_data: &[u8],
        mut on_response: F,
        metadata: &[GrpcMetadata],
        cancel: &CancellationToken,
    ) -> GrpcStatus
    where
        F: FnMut(GrpcResponse) -> GrpcStatus,
    {
        let framed = match framing::pack(request_data) {
            Ok(framed) => framed,
            Err(err) => return GrpcStatus::internal(err.to_string()),
        };
        match self
            .stream_inner(service, method, framed, &mut on_response, metadata, cancel)
            .await
        {
            Ok(status) => status,
            Err(err) => err.into(),
        }
    }

    async fn stream_inner<F>(
        &self,
        service: &str,
        method: &str,
        framed: Bytes,
        on_response: &mut F,
        metadata: &[GrpcMetadata],
        cancel: &CancellationToken,
    ) -> Result<GrpcStatus, TransportError>
    where
        F: FnMut(GrpcResponse) -> GrpcStatus,
    {
        let request = self.build_request(service, method, metadata)?;
        let mut sender = self.connect().await?.ready().await?;
        let (response, mut request_body) = sender.send_request(request, false)?;
        request_body.send_data(framed, true)?;

        let response = tokio::select! {
            response = response => response?,
            () = cancel.cancelled() => return Ok(GrpcStatus::cancelled()),
        };
        let (head, mut body) = response.into_parts();

        // Stream buffer: bytes append at the tail, whole frames are
        // consumed from the head in place.
        let mut buffer = BytesMut::new();
        loop {
            // The token is only observed between transfer progress,
            // never mid-callback: frames already drained below always
            // reach the callback before a pending cancel is seen.
            if cancel.is_cancelled() {
                return Ok(GrpcStatus::cancelled());
            }
            let chunk = tokio::select! {
                chunk = body.data() => chunk,
                () = cancel.cancelled() => return Ok(GrpcStatus::cancelled()),
            };
            let Some(chunk) = chunk else { break };
            let chunk = chunk?;
            let received = chunk.len();
            buffer.extend_from_slice(&chunk);

            while let FramePeek {
                ready: true,
                frame_len,
            } = framing::try_peek(&buffer)
            {
                // The frame leaves the buffer whether or not the
                // callback accepts it.
                let frame = buffer.split_to(frame_len).freeze();
                let payload = match framing::unpack(&frame) {
                    Ok(payload) => frame.slice_ref(payload),
                    Err(_) => return Ok(GrpcStatus::internal(UNPACK_FAILED)),
                };
                let status = on_response(GrpcResponse { data: payload });
                if !status.is_ok() {
                    return Ok(status);
                }
            }

            // Window capacity comes back only after the callback has
            // consumed the frames this chunk completed, so a slow
            // callback holds the server back.
            let _ = body.flow_control().release_capacity(received);
        }
        let trailers = body.trailers().await?;

        if head.status != StatusCode::OK {
            return Ok(GrpcStatus::internal(format!(
                "HTTP error: {}",
                head.status.as_u16()
            )));
        }
        debug!(service, method, "stream complete");
        Ok(extract_grpc_status(&head.headers, trailers.as_ref()))
    }
}

/// Reads `grpc-status`/`grpc-message` from the response headers or
/// trailers. Servers that fail before producing a body put the status
/// in the initial HEADERS frame; everything else arrives as trailers.
///
/// A missing `grpc-status` on an otherwise complete HTTP 200 exchange
/// counts as OK.
fn extract_grpc_status(headers: &HeaderMap, trailers: Option<&HeaderMap>) -> GrpcStatus {
    let find = |name: &str| {
        headers
            .get(name)
            .or_else(|| trailers.and_then(|t| t.get(name)))
    };

    let Some(value) = find("grpc-status") else {
        return GrpcStatus::ok();
    };
    let code = value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse::<i32>().ok())
        .unwrap_or(code::OK);
    if code == code::OK {
        return GrpcStatus::ok();
    }

    let message = find("grpc-message")
        .and_then(|v| v.to_str().ok())
        .map(|raw| percent_decode_str(raw).decode_utf8_lossy().into_owned())
        .unwrap_or_default();
    GrpcStatus { code, message }
}
