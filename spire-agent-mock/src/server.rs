use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use bytes::{BufMut, Bytes, BytesMut};
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Response, StatusCode};
use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinHandle;
use tracing::debug;

pub const FETCH_X509_SVID_PATH: &str = "/SpiffeWorkloadAPI/FetchX509SVID";
pub const FETCH_X509_BUNDLES_PATH: &str = "/SpiffeWorkloadAPI/FetchX509Bundles";
pub const FETCH_JWT_SVID_PATH: &str = "/SpiffeWorkloadAPI/FetchJWTSVID";
pub const FETCH_JWT_BUNDLES_PATH: &str = "/SpiffeWorkloadAPI/FetchJWTBundles";

/// Wraps `payload` in the gRPC 5-byte length prefix.
pub fn frame(payload: &[u8]) -> Bytes {
    let mut framed = BytesMut::with_capacity(5 + payload.len());
    framed.put_u8(0);
    framed.put_u32(payload.len() as u32);
    framed.extend_from_slice(payload);
    framed.freeze()
}

/// Encodes a protobuf message and frames it.
pub fn frame_message(message: &impl prost::Message) -> Bytes {
    frame(&message.encode_to_vec())
}

/// Script for one method path: what goes on the wire, verbatim.
#[derive(Debug, Clone, Default)]
pub struct Reply {
    /// DATA chunks, in order. Usually whole frames, but a chunk may
    /// carry several frames, a partial frame, or deliberate garbage.
    pub chunks: Vec<Bytes>,
    /// Sleep before sending the response headers.
    pub delay: Option<Duration>,
    /// Sleep before every chunk after the first, keeping the stream
    /// open long enough for a caller to cancel mid-flight.
    pub pause: Option<Duration>,
    /// Trailers, sent verbatim (values are not percent-encoded here).
    /// When empty, `grpc-status: 0` is sent.
    pub trailers: Vec<(String, String)>,
    /// Overrides the 200 response status.
    pub http_status: Option<u16>,
}

impl Reply {
    /// OK reply carrying one framed protobuf message.
    pub fn message(message: &impl prost::Message) -> Self {
        Self::messages([message])
    }

    /// OK reply carrying one framed protobuf message per stream item.
    pub fn messages<'a, M, I>(messages: I) -> Self
    where
        M: prost::Message + 'a,
        I: IntoIterator<Item = &'a M>,
    {
        Self {
            chunks: messages.into_iter().map(frame_message).collect(),
            ..Self::default()
        }
    }

    /// Empty-bodied reply with a non-OK trailer status.
    pub fn grpc_status(code: i32, message: &str) -> Self {
        Self::default()
            .with_trailer("grpc-status", code.to_string())
            .with_trailer("grpc-message", message)
    }

    pub fn with_chunk(mut self, chunk: impl Into<Bytes>) -> Self {
        self.chunks.push(chunk.into());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = Some(pause);
        self
    }

    pub fn with_trailer(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.trailers.push((key.into(), value.into()));
        self
    }

    pub fn with_http_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }
}

/// One request the agent accepted.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

type Recorded = Arc<Mutex<Vec<RecordedRequest>>>;

/// A scripted Workload API agent bound to a Unix socket.
#[derive(Debug, Default)]
pub struct MockAgent {
    routes: HashMap<String, Reply>,
}

impl MockAgent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the reply for one method path.
    pub fn route(mut self, path: impl Into<String>, reply: Reply) -> Self {
        self.routes.insert(path.into(), reply);
        self
    }

    /// Binds `socket_path` and serves in a background task until the
    /// returned handle is dropped.
    pub fn spawn(self, socket_path: &Path) -> Result<MockAgentHandle> {
        let listener = UnixListener::bind(socket_path)?;
        let requests: Recorded = Arc::new(Mutex::new(Vec::new()));
        let routes = Arc::new(self.routes);
        let task = tokio::spawn(accept_loop(listener, routes, Arc::clone(&requests)));
        Ok(MockAgentHandle { requests, task })
    }
}

/// Owner of a running mock agent; aborts it on drop.
#[derive(Debug)]
pub struct MockAgentHandle {
    requests: Recorded,
    task: JoinHandle<()>,
}

impl MockAgentHandle {
    /// Everything the agent has accepted so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().expect("request log poisoned").clone()
    }
}

impl Drop for MockAgentHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn accept_loop(
    listener: UnixListener,
    routes: Arc<HashMap<String, Reply>>,
    requests: Recorded,
) {
    loop {
        let Ok((stream, _)) = listener.accept().await else {
            break;
        };
        let routes = Arc::clone(&routes);
        let requests = Arc::clone(&requests);
        tokio::spawn(async move {
            if let Err(err) = handle_connection(stream, routes, requests).await {
                // Callers hanging up mid-stream land here; that is a
                // scripted outcome, not a failure.
                debug!(%err, "mock agent connection ended");
            }
        });
    }
}

async fn handle_connection(
    stream: UnixStream,
    routes: Arc<HashMap<String, Reply>>,
    requests: Recorded,
) -> Result<()> {
    let mut connection = h2::server::handshake(stream).await?;
    while let Some(accepted) = connection.accept().await {
        let (request, mut respond) = accepted?;
        let (head, mut body) = request.into_parts();

        let mut data = BytesMut::new();
        while let Some(chunk) = body.data().await {
            let chunk = chunk?;
            let _ = body.flow_control().release_capacity(chunk.len());
            data.extend_from_slice(&chunk);
        }

        let path = head.uri.path().to_owned();
        requests
            .lock()
            .expect("request log poisoned")
            .push(RecordedRequest {
                path: path.clone(),
                headers: head.headers,
                body: data.freeze(),
            });

        let reply = routes
            .get(&path)
            .cloned()
            .unwrap_or_else(|| Reply::grpc_status(12, "unknown method"));

        if let Some(delay) = reply.delay {
            tokio::time::sleep(delay).await;
        }

        let status = reply
            .http_status
            .map(StatusCode::from_u16)
            .transpose()?
            .unwrap_or(StatusCode::OK);
        let response = Response::builder()
            .status(status)
            .header("content-type", "application/grpc+proto")
            .body(())?;
        let mut sender = respond.send_response(response, false)?;

        let mut first = true;
        for chunk in &reply.chunks {
            if !first {
                if let Some(pause) = reply.pause {
                    tokio::time::sleep(pause).await;
                }
            }
            first = false;
            sender.send_data(chunk.clone(), false)?;
        }

        let mut trailers = HeaderMap::new();
        if reply.trailers.is_empty() {
            trailers.insert("grpc-status", HeaderValue::from_static("0"));
        } else {
            for (key, value) in &reply.trailers {
                trailers.append(
                    HeaderName::from_bytes(key.as_bytes())?,
                    HeaderValue::from_str(value)?,
                );
            }
        }
        sender.send_trailers(trailers)?;
    }
    Ok(())
}
