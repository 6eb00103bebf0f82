//! Scripted SPIFFE Workload API agent for tests and demos.
//!
//! Serves raw h2 rather than a real gRPC stack so tests can script
//! wire-level behavior no well-behaved server would produce: broken
//! framing, compressed frames, arbitrary trailers, stalls between
//! messages. Every request is recorded (path, headers, body) for
//! assertion.

pub mod proto;
pub mod server;

pub use server::{frame, frame_message, MockAgent, MockAgentHandle, RecordedRequest, Reply};
