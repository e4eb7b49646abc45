//! Protocol module containing packet types, the binary codec, and the
//! incremental frame reader.

pub mod codec;
pub mod frame;
pub mod messages;

pub use codec::{
    decode_message, decode_packet, encode_message, encode_packet, encode_packet_into,
    encode_payload, Packet, ProtocolError,
};
pub use frame::FrameReader;
pub use messages::*;
