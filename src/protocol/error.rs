//! Framing errors.

use std::io;
use thiserror::Error;

/// Errors produced while encoding or reading a frame.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The payload length does not fit in the header as decimal digits.
    #[error("payload of {len} bytes cannot be described by a {width}-byte header")]
    Encoding { len: usize, width: usize },

    /// The header is not a non-negative decimal integer.
    #[error("invalid header: {0:?}")]
    InvalidHeader(String),

    /// The header declares more bytes than this endpoint accepts.
    #[error("declared payload of {len} bytes exceeds limit of {max}")]
    PayloadTooLarge { len: usize, max: usize },

    /// The payload is not valid UTF-8.
    #[error("payload is not valid UTF-8")]
    InvalidUtf8,

    /// The stream ended part way through a frame.
    #[error("stream ended after {got} of {expected} bytes")]
    Truncated { expected: usize, got: usize },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl FrameError {
    /// Header-level failures: the peer is not speaking the protocol.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            FrameError::InvalidHeader(_) | FrameError::PayloadTooLarge { .. }
        )
    }

    /// The peer reset the connection under us.
    pub fn is_reset(&self) -> bool {
        matches!(self, FrameError::Io(e) if e.kind() == io::ErrorKind::ConnectionReset)
    }
}
