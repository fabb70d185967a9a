//! Integration tests for the probe-core frame codec.
//!
//! These tests drive the codec through the public API only and check the
//! properties the device firmware depends on: exact round trips, checksum
//! sensitivity to every bit it covers, and the order in which malformed
//! buffers are rejected.

use probe_core::{
    decode_frame, encode_frame, keepalive_frame,
    protocol::frame::{FRAME_OVERHEAD, HEADER_SIZE, KEEPALIVE_FN},
    Device, DeviceStatus, ProtocolError,
};

/// Deterministic filler so failures are reproducible.
fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 + 7) as u8).collect()
}

#[test]
fn test_round_trip_for_every_length_up_to_600() {
    for len in 0..600 {
        let data = pattern(len);
        let function = len as u32 * 3;
        let stage = u32::MAX - len as u32;

        let bytes = encode_frame(function, stage, &data);
        let frame = decode_frame(&bytes)
            .unwrap_or_else(|e| panic!("length {len} failed to decode: {e}"));

        assert_eq!(frame.function, function, "length {len}");
        assert_eq!(frame.stage, stage, "length {len}");
        assert_eq!(frame.data, &data[..], "length {len}");
    }
}

#[test]
fn test_single_bit_flip_in_checksummed_region_is_detected() {
    // Arrange
    let bytes = encode_frame(0x0102_0304, 0x0A0B_0C0D, b"checksum coverage");

    // Act / Assert: every bit from the start of payload info to the end
    for byte_index in HEADER_SIZE..bytes.len() {
        for bit in 0..8 {
            let mut corrupted = bytes.clone();
            corrupted[byte_index] ^= 1 << bit;
            assert!(
                matches!(
                    decode_frame(&corrupted),
                    Err(ProtocolError::ChecksumMismatch { .. })
                ),
                "flip of bit {bit} in byte {byte_index} must fail the checksum"
            );
        }
    }
}

#[test]
fn test_wrong_magic_is_reported_before_other_errors() {
    // A frame with bad magic AND a corrupt checksum AND an oversized length
    // must still be reported as BadMagic.
    let mut bytes = encode_frame(1, 2, b"abc");
    bytes[0..4].copy_from_slice(&0x1234_5678u32.to_le_bytes());
    bytes[8..12].copy_from_slice(&10_000u32.to_le_bytes());
    bytes[16] = bytes[16].wrapping_add(1);

    assert_eq!(decode_frame(&bytes), Err(ProtocolError::BadMagic(0x1234_5678)));
}

#[test]
fn test_every_truncation_below_declared_size_is_incomplete_data() {
    let bytes = encode_frame(9, 9, &pattern(40));

    for cut in FRAME_OVERHEAD..bytes.len() {
        assert!(
            matches!(
                decode_frame(&bytes[..cut]),
                Err(ProtocolError::IncompleteData { declared: 40, .. })
            ),
            "buffer of {cut} bytes must be IncompleteData"
        );
    }
}

#[test]
fn test_every_buffer_shorter_than_overhead_is_incomplete_header() {
    let bytes = encode_frame(9, 9, &pattern(4));

    for cut in 0..FRAME_OVERHEAD {
        assert!(matches!(
            decode_frame(&bytes[..cut]),
            Err(ProtocolError::IncompleteHeader { .. })
        ));
    }
}

#[test]
fn test_keepalive_decodes_as_keepalive() {
    let bytes = keepalive_frame();
    let frame = decode_frame(&bytes).expect("keepalive must decode");
    assert_eq!(frame.function, KEEPALIVE_FN);
    assert_eq!(frame.stage, 0);
    assert_eq!(frame.data, &[0x00]);
}

#[test]
fn test_device_json_shape_omits_missing_session_address() {
    let device = Device::available("10.0.0.5", "Sensor1");
    let json = serde_json::to_value(&device).unwrap();

    assert_eq!(
        json,
        serde_json::json!({"ip": "10.0.0.5", "id": "Sensor1", "status": "Available"})
    );
}

#[test]
fn test_device_json_shape_for_connected_device() {
    let device = Device {
        ip: "10.0.0.5".to_string(),
        id: "Sensor1".to_string(),
        status: DeviceStatus::Connected,
        connected_via: Some("10.0.0.2".to_string()),
    };
    let json = serde_json::to_value(&device).unwrap();

    assert_eq!(json["status"], "Connected");
    assert_eq!(json["connected_via"], "10.0.0.2");
}
