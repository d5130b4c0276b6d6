//! Protocol module containing message types and the JSON codec.

pub mod codec;
pub mod messages;

pub use codec::{current_timestamp_ms, decode_inbound, encode_outbound, ProtocolError};
pub use messages::*;
