//! Wire protocol: framing codec and message types.

mod codec;
mod messages;

pub use codec::{MessageCodec, HEADER_LENGTH, MAX_FRAME_LENGTH};
pub use messages::{ClientMessage, Envelope, PlayerScore, ServerMessage};
