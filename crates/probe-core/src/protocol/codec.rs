//! Binary codec for encoding and decoding probe frames.
//!
//! Wire format:
//! ```text
//! [magic:4][total_size:4][data_size:4][data_offset:4][checksum:1][fn:4][stage:4][data:N]
//! ```
//! Total fixed size: 25 bytes. All multi-byte integers are little-endian.
//!
//! # The checksum (for beginners)
//!
//! The device firmware calls the last header byte a "CRC", but it is a plain
//! 8-bit additive sum: every byte of `fn ‖ stage ‖ data` is added together and
//! only the low 8 bits are kept.  A real CRC-8 would produce different values
//! and the device would reject our frames, so [`checksum`] must stay additive.
//!
//! `total_size` and `data_size` both carry the data length.  The firmware
//! reads `data_size`; `total_size` is written for compatibility and ignored on
//! decode, as is the always-zero `data_offset`.

use thiserror::Error;

use crate::protocol::frame::{
    Frame, CHECKSUM_OFFSET, DATA_SIZE_OFFSET, FRAME_MAGIC, FRAME_OVERHEAD, HEADER_SIZE,
    KEEPALIVE_DATA, KEEPALIVE_FN, KEEPALIVE_STAGE,
};

/// Errors that can occur while decoding a frame.
///
/// Every variant is recoverable: the caller drops the offending datagram and
/// keeps going.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The buffer cannot even hold the header and payload info.
    #[error("incomplete header: need at least {needed} bytes, got {available}")]
    IncompleteHeader { needed: usize, available: usize },

    /// The first four bytes are not [`FRAME_MAGIC`].
    #[error("bad magic: 0x{0:08X}")]
    BadMagic(u32),

    /// The header declares more data than the buffer holds.
    #[error("incomplete data: header declares {declared} bytes, {available} available")]
    IncompleteData { declared: usize, available: usize },

    /// The additive checksum does not match the received byte.
    #[error("checksum mismatch: frame carries 0x{received:02X}, computed 0x{computed:02X}")]
    ChecksumMismatch { received: u8, computed: u8 },
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Computes the 8-bit additive checksum over `fn ‖ stage ‖ data`.
///
/// # Examples
///
/// ```rust
/// use probe_core::checksum;
///
/// assert_eq!(checksum(&[0x01, 0x02, 0xFF]), 0x02);
/// ```
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |sum, b| sum.wrapping_add(*b))
}

/// Encodes one frame carrying `function`, `stage` and `data`.
///
/// # Examples
///
/// ```rust
/// use probe_core::{decode_frame, encode_frame};
///
/// let bytes = encode_frame(3, 1, b"hello");
/// let frame = decode_frame(&bytes).unwrap();
/// assert_eq!((frame.function, frame.stage, frame.data), (3, 1, &b"hello"[..]));
/// ```
pub fn encode_frame(function: u32, stage: u32, data: &[u8]) -> Vec<u8> {
    let data_len = data.len() as u32;
    let function_bytes = function.to_le_bytes();
    let stage_bytes = stage.to_le_bytes();

    let sum = checksum(&function_bytes)
        .wrapping_add(checksum(&stage_bytes))
        .wrapping_add(checksum(data));

    let mut buf = Vec::with_capacity(FRAME_OVERHEAD + data.len());

    // Header: magic (4) + total_size (4) + data_size (4) + data_offset (4) +
    //         checksum (1) = 17 bytes
    buf.extend_from_slice(&FRAME_MAGIC.to_le_bytes());
    buf.extend_from_slice(&data_len.to_le_bytes());
    buf.extend_from_slice(&data_len.to_le_bytes());
    buf.extend_from_slice(&0u32.to_le_bytes());
    buf.push(sum);

    buf.extend_from_slice(&function_bytes);
    buf.extend_from_slice(&stage_bytes);
    buf.extend_from_slice(data);
    buf
}

/// Encodes the keepalive frame sent by every open session.
pub fn keepalive_frame() -> Vec<u8> {
    encode_frame(KEEPALIVE_FN, KEEPALIVE_STAGE, &KEEPALIVE_DATA)
}

/// Decodes one frame from the beginning of `bytes`.
///
/// Trailing bytes beyond `25 + data_size` are ignored.
///
/// # Errors
///
/// Checks run in this order, and the first failure is returned:
/// [`ProtocolError::IncompleteHeader`], [`ProtocolError::BadMagic`],
/// [`ProtocolError::IncompleteData`], [`ProtocolError::ChecksumMismatch`].
pub fn decode_frame(bytes: &[u8]) -> Result<Frame<'_>, ProtocolError> {
    if bytes.len() < FRAME_OVERHEAD {
        return Err(ProtocolError::IncompleteHeader {
            needed: FRAME_OVERHEAD,
            available: bytes.len(),
        });
    }

    let magic = read_u32_le(bytes, 0);
    if magic != FRAME_MAGIC {
        return Err(ProtocolError::BadMagic(magic));
    }

    let data_size = read_u32_le(bytes, DATA_SIZE_OFFSET) as usize;
    let available = bytes.len() - FRAME_OVERHEAD;
    if data_size > available {
        return Err(ProtocolError::IncompleteData {
            declared: data_size,
            available,
        });
    }

    let covered = &bytes[HEADER_SIZE..FRAME_OVERHEAD + data_size];
    let received = bytes[CHECKSUM_OFFSET];
    let computed = checksum(covered);
    if received != computed {
        return Err(ProtocolError::ChecksumMismatch { received, computed });
    }

    Ok(Frame {
        function: read_u32_le(bytes, HEADER_SIZE),
        stage: read_u32_le(bytes, HEADER_SIZE + 4),
        data: &bytes[FRAME_OVERHEAD..FRAME_OVERHEAD + data_size],
    })
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Reads a little-endian `u32` at `offset`.  Callers guarantee the bounds.
fn read_u32_le(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

// ── Tests ─────────────────────────────────────────────────────────────────────
