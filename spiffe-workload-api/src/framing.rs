//! gRPC length-prefixed message framing.
//!
//! Every message on a gRPC stream is `1 byte compression flag || 4
//! bytes big-endian length || payload`. This client only speaks the
//! identity encoding: outbound frames always carry flag 0 and inbound
//! frames with any other flag are rejected.
//!
//! The framer is stateless. The transport owns the stream buffer,
//! peeks for a complete frame, and removes `frame_len` bytes after
//! each successful unpack.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Compression flag plus the four length octets.
pub(crate) const FRAME_HEADER_LEN: usize = 5;

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum FrameError {
    #[error("message of {0} bytes does not fit the u32 length prefix")]
    Oversize(usize),

    #[error("frame truncated (got {got} bytes, need {need})")]
    Truncated { got: usize, need: usize },

    #[error("compressed frame received, but only identity encoding was advertised")]
    Compressed,
}

/// Wraps one protobuf payload in a gRPC frame.
pub(crate) fn pack(payload: &[u8]) -> Result<Bytes, FrameError> {
    let len = u32::try_from(payload.len()).map_err(|_| FrameError::Oversize(payload.len()))?;
    let mut frame = BytesMut::with_capacity(FRAME_HEADER_LEN + payload.len());
    frame.put_u8(0);
    frame.put_u32(len);
    frame.extend_from_slice(payload);
    Ok(frame.freeze())
}

/// What the head of a stream buffer holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FramePeek {
    /// Whether the buffer already holds the whole frame.
    pub ready: bool,
    /// Size of the frame including its header; 0 until the header has
    /// arrived.
    pub frame_len: usize,
}

/// Checks whether a complete frame sits at the head of `buf`.
pub(crate) fn try_peek(buf: &[u8]) -> FramePeek {
    if buf.len() < FRAME_HEADER_LEN {
        return FramePeek {
            ready: false,
            frame_len: 0,
        };
    }
    let len = u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]) as usize;
    let frame_len = FRAME_HEADER_LEN + len;
    FramePeek {
        ready: buf.len() >= frame_len,
        frame_len,
    }
}

/// Validates a complete frame and returns its payload.
pub(crate) fn unpack(frame: &[u8]) -> Result<&[u8], FrameError> {
    if frame.len() < FRAME_HEADER_LEN {
        return Err(FrameError::Truncated {
            got: frame.len(),
            need: FRAME_HEADER_LEN,
        });
    }
    if frame[0] != 0 {
        return Err(FrameError::Compressed);
    }
    let len = u32::from_be_bytes([frame[1], frame[2], frame[3], frame[4]]) as usize;
    frame
        .get(FRAME_HEADER_LEN..FRAME_HEADER_LEN + len)
        .ok_or(FrameError::Truncated {
            got: frame.len(),
            need: FRAME_HEADER_LEN + len,
        })
}
