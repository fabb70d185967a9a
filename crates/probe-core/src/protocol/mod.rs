//! Protocol module containing the frame layout constants and the binary codec.

pub mod codec;
pub mod frame;

pub use codec::{checksum, decode_frame, encode_frame, keepalive_frame, ProtocolError};
pub use frame::*;
