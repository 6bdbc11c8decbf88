//! Frame decoder
//!
//! Turns raw socket frames into [`Envelope`]s. Text frames are parsed directly;
//! binary frames carry a zlib-wrapped DEFLATE stream that is inflated first.

use crate::protocol::Envelope;
use flate2::{Decompress, FlushDecompress, Status};
use thiserror::Error;

/// Growth step for the inflate output buffer
const INFLATE_CHUNK: usize = 16 * 1024;

/// Largest payload a single compressed frame may inflate to
pub const MAX_INFLATED_SIZE: usize = 16 * 1024 * 1024;

/// Raw frame read from the socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

/// Frame decode error
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The compressed stream is invalid
    #[error("Inflate failed: {0}")]
    Inflate(String),

    /// Input ended before the compressed stream did
    #[error("Compressed frame is truncated")]
    Truncated,

    /// The frame inflates past the size limit
    #[error("Compressed frame inflates past {0} bytes")]
    TooLarge(usize),

    /// The frame is not a valid envelope
    #[error("Malformed payload: {0}")]
    Json(#[from] serde_json::Error),
}

impl DecodeError {
    /// Whether the connection's compressed stream can no longer be trusted
    #[must_use]
    pub fn is_corrupt_stream(&self) -> bool {
        matches!(self, Self::Inflate(_) | Self::Truncated | Self::TooLarge(_))
    }
}

/// Decode one frame
pub fn decode(frame: &Frame) -> Result<Envelope, DecodeError> {
    match frame {
        Frame::Text(text) => Ok(Envelope::from_slice(text.as_bytes())?),
        Frame::Binary(bytes) => {
            let inflated = inflate(bytes)?;
            Ok(Envelope::from_slice(&inflated)?)
        }
    }
}

/// Inflate a complete zlib stream, chunk by chunk, until its end marker
pub fn inflate(input: &[u8]) -> Result<Vec<u8>, DecodeError> {
    inflate_with_limit(input, MAX_INFLATED_SIZE)
}

/// Like [`inflate`], failing with [`DecodeError::TooLarge`] past `limit` bytes
pub fn inflate_with_limit(input: &[u8], limit: usize) -> Result<Vec<u8>, DecodeError> {
    let mut inflater = Decompress::new(true);
    let initial = input
        .len()
        .saturating_mul(4)
        .max(INFLATE_CHUNK)
        .min(limit.saturating_add(1));
    let mut output = Vec::with_capacity(initial);

    loop {
        if output.len() == output.capacity() {
            output.reserve(INFLATE_CHUNK);
        }

        let consumed = inflater.total_in() as usize;
        let produced = inflater.total_out();

        let status = inflater
            .decompress_vec(&input[consumed..], &mut output, FlushDecompress::None)
            .map_err(|e| DecodeError::Inflate(e.to_string()))?;

        if output.len() > limit {
            return Err(DecodeError::TooLarge(limit));
        }

        match status {
            Status::StreamEnd => return Ok(output),
            Status::Ok | Status::BufError => {
                let progressed = inflater.total_in() as usize != consumed
                    || inflater.total_out() != produced;
                // No progress with room left in the output means the input ran out
                if !progressed && output.len() < output.capacity() {
                    return Err(DecodeError::Truncated);
                }
            }
        }
    }
}
