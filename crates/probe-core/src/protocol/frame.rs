//! Frame layout constants and the decoded frame view.
//!
//! Every frame on the session port has the same shape:
//!
//! ```text
//! ┌──────────── header (17) ─────────────┐┌─ payload info (8) ─┐┌─ data ─┐
//! [magic:4][total:4][size:4][offset:4][sum:1][fn:4][stage:4]     [size bytes]
//! ```
//!
//! All multi-byte integers are little-endian.

// ── Layout constants ──────────────────────────────────────────────────────────

/// Sentinel value at the start of every frame.
pub const FRAME_MAGIC: u32 = 0xA5A5_5A5A;

/// Size of the fixed header (magic, two size fields, offset, checksum).
pub const HEADER_SIZE: usize = 17;

/// Size of the payload-info block (`fn` + `stage`).
pub const PAYLOAD_INFO_SIZE: usize = 8;

/// Minimum size of a frame: header plus payload info, with no data.
pub const FRAME_OVERHEAD: usize = HEADER_SIZE + PAYLOAD_INFO_SIZE;

/// Byte offset of the `data_size` field inside the header.
pub(crate) const DATA_SIZE_OFFSET: usize = 8;

/// Byte offset of the checksum byte inside the header.
pub(crate) const CHECKSUM_OFFSET: usize = 16;

/// Function code carried by keepalive frames.
pub const KEEPALIVE_FN: u32 = 0xFFFF_FFFF;

/// Stage carried by keepalive frames.
pub const KEEPALIVE_STAGE: u32 = 0;

/// Data carried by keepalive frames.
pub const KEEPALIVE_DATA: [u8; 1] = [0x00];

// ── Decoded view ──────────────────────────────────────────────────────────────

/// A decoded frame borrowing its data from the receive buffer.
///
/// The `data` slice lives only as long as the buffer passed to
/// [`decode_frame`](crate::protocol::codec::decode_frame); copy it out with
/// `to_vec()` if the buffer is about to be reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    /// Function code.
    pub function: u32,
    /// Stage within the function.
    pub stage: u32,
    /// Exactly `data_size` bytes following the payload info.
    pub data: &'a [u8],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_overhead_is_25_bytes() {
        assert_eq!(FRAME_OVERHEAD, 25);
    }
}
