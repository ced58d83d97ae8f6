//! Length-prefixed JSON framing.
//!
//! ```text
//! +----------------+---------------------------+
//! | u32 BE length  | UTF-8 JSON body (length)  |
//! +----------------+---------------------------+
//! ```
//!
//! The declared length is checked before any body bytes are buffered, so a
//! hostile peer cannot make the server reserve more than [`MAX_FRAME_LENGTH`].

use bytes::{Buf, BufMut, BytesMut};
use serde::Serialize;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProtocolError;

use super::messages::Envelope;

/// Size of the length prefix.
pub const HEADER_LENGTH: usize = 4;

/// Largest accepted body, 10 MiB.
pub const MAX_FRAME_LENGTH: usize = 10 * 1024 * 1024;

/// Codec for `[u32 BE length][JSON]` frames.
///
/// Decodes into [`Envelope`]; encodes any serializable message whose JSON form
/// is an `{action, payload}` object.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageCodec;

impl Decoder for MessageCodec {
    type Item = Envelope;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_LENGTH {
            return Ok(None);
        }

        let mut prefix = [0u8; HEADER_LENGTH];
        prefix.copy_from_slice(&src[..HEADER_LENGTH]);
        let len = u32::from_be_bytes(prefix) as usize;

        if len > MAX_FRAME_LENGTH {
            return Err(ProtocolError::too_large(len));
        }

        if src.len() < HEADER_LENGTH + len {
            src.reserve(HEADER_LENGTH + len - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LENGTH);
        let body = src.split_to(len);
        let envelope = serde_json::from_slice(&body)?;
        Ok(Some(envelope))
    }
}

impl<T: Serialize> Encoder<T> for MessageCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let body = serde_json::to_vec(&item)?;
        if body.len() > MAX_FRAME_LENGTH {
            return Err(ProtocolError::too_large(body.len()));
        }

        dst.reserve(HEADER_LENGTH + body.len());
        dst.put_u32(body.len() as u32);
        dst.extend_from_slice(&body);
        Ok(())
    }
}
