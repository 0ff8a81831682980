//! Length-prefixed framing and payload encoding.
//!
//! Each frame is a 4-byte big-endian payload length followed by exactly that
//! many bytes of protobuf payload. The length excludes the header itself.
//!
//! [`FrameDecoder`] performs streaming reassembly: bytes arrive in arbitrary
//! chunks, and a payload is only handed out once it is complete. A declared
//! length above the configured maximum is rejected as soon as the header is
//! read, before any payload is buffered.

use super::{wire, Request, Response};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use prost::Message;
use thiserror::Error;

/// Size of the length prefix.
pub const HEADER_LEN: usize = 4;

/// Default maximum payload size (32 KiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 32 * 1024;

/// Framing and payload errors.
///
/// All of these leave the byte stream out of sync with the sender, so a
/// connection that hits one is closed.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("frame of {len} bytes exceeds maximum of {max} bytes")]
    FrameTooLarge { len: usize, max: usize },

    #[error("frame declares {declared} payload bytes but {actual} are present")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("malformed payload: {0}")]
    MalformedPayload(#[from] prost::DecodeError),

    #[error("response {id} carries no result")]
    MissingResult { id: i64 },
}

/// Reassembly state of a [`FrameDecoder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeState {
    /// Fewer than [`HEADER_LEN`] bytes of the next frame are buffered.
    AwaitingHeader,
    /// Header consumed; waiting for `len` payload bytes.
    AwaitingPayload { len: usize },
}

/// Streaming frame decoder.
#[derive(Debug)]
pub struct FrameDecoder {
    state: DecodeState,
    max_frame_size: usize,
}

impl FrameDecoder {
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            state: DecodeState::AwaitingHeader,
            max_frame_size,
        }
    }

    pub fn state(&self) -> DecodeState {
        self.state
    }

    /// Take the next complete payload out of `buf`.
    ///
    /// Returns `Ok(None)` when more bytes are needed. Consumed bytes are
    /// removed from `buf`; trailing bytes of the next frame stay buffered.
    pub fn decode_frame(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, CodecError> {
        if self.state == DecodeState::AwaitingHeader {
            if buf.len() < HEADER_LEN {
                return Ok(None);
            }
            let len = buf.get_u32() as usize;
            if len > self.max_frame_size {
                return Err(CodecError::FrameTooLarge {
                    len,
                    max: self.max_frame_size,
                });
            }
            buf.reserve(len.saturating_sub(buf.len()));
            self.state = DecodeState::AwaitingPayload { len };
        }

        match self.state {
            DecodeState::AwaitingPayload { len } if buf.len() >= len => {
                self.state = DecodeState::AwaitingHeader;
                Ok(Some(buf.split_to(len).freeze()))
            }
            _ => Ok(None),
        }
    }

    /// Take and decode the next complete request out of `buf`.
    pub fn decode_request(&mut self, buf: &mut BytesMut) -> Result<Option<Request>, CodecError> {
        match self.decode_frame(buf)? {
            Some(payload) => decode_request(&payload).map(Some),
            None => Ok(None),
        }
    }

    /// True when no partial frame is buffered in `buf`.
    pub fn is_idle(&self, buf: &BytesMut) -> bool {
        self.state == DecodeState::AwaitingHeader && buf.is_empty()
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

/// Decode a request payload (without header).
pub fn decode_request(payload: &[u8]) -> Result<Request, CodecError> {
    let msg = wire::Request::decode(payload)?;
    Ok(msg.into())
}

/// Decode a response payload (without header).
pub fn decode_response(payload: &[u8]) -> Result<Response, CodecError> {
    let msg = wire::Response::decode(payload)?;
    Response::try_from(msg)
}

/// Decode a complete request frame.
///
/// Succeeds only if the declared length matches the remaining byte count
/// exactly and the payload is a valid request.
pub fn decode_request_frame(frame: &[u8], max_frame_size: usize) -> Result<Request, CodecError> {
    let (declared, payload) = split_frame(frame)?;
    if declared > max_frame_size {
        return Err(CodecError::FrameTooLarge {
            len: declared,
            max: max_frame_size,
        });
    }
    if declared != payload.len() {
        return Err(CodecError::LengthMismatch {
            declared,
            actual: payload.len(),
        });
    }
    decode_request(payload)
}

fn split_frame(frame: &[u8]) -> Result<(usize, &[u8]), CodecError> {
    if frame.len() < HEADER_LEN {
        return Err(CodecError::LengthMismatch {
            declared: HEADER_LEN,
            actual: frame.len(),
        });
    }
    let (header, payload) = frame.split_at(HEADER_LEN);
    let declared = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
    Ok((declared, payload))
}

/// Append a framed response to `dst`.
pub fn encode_response(response: &Response, dst: &mut BytesMut) {
    encode_frame(&wire::Response::from(response), dst);
}

/// Append a framed request to `dst`.
pub fn encode_request(request: &Request, dst: &mut BytesMut) {
    encode_frame(&wire::Request::from(request), dst);
}

fn encode_frame<M: Message>(msg: &M, dst: &mut BytesMut) {
    let payload = msg.encode_to_vec();
    dst.reserve(HEADER_LEN + payload.len());
    dst.put_u32(payload.len() as u32);
    dst.extend_from_slice(&payload);
}
