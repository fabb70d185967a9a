//! Human-readable descriptions of frames received on a session.

use probe_core::Frame;

/// Longest data excerpt shown in a response line, in characters.
pub const MAX_DATA_CHARS: usize = 50;

/// Formats a decoded session frame for the log hub.
///
/// ```text
/// CMD_RESP from 10.0.0.5 - FN:7, STAGE:1, DATA: 'ok'
/// ```
///
/// The data excerpt is omitted for empty payloads.  Payloads that are not
/// valid UTF-8 are decoded lossily.
pub fn describe_response(ip: &str, frame: &Frame<'_>) -> String {
    let mut line = format!(
        "CMD_RESP from {ip} - FN:{}, STAGE:{}",
        frame.function, frame.stage
    );

    if !frame.data.is_empty() {
        let text = String::from_utf8_lossy(frame.data);
        line.push_str(", DATA: '");
        line.push_str(&excerpt(&text));
        line.push('\'');
    }
    line
}

fn excerpt(text: &str) -> String {
    match text.char_indices().nth(MAX_DATA_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(data: &[u8]) -> Frame<'_> {
        Frame {
            function: 7,
            stage: 1,
            data,
        }
    }

    #[test]
    fn test_empty_data_has_no_excerpt() {
        let line = describe_response("10.0.0.5", &frame(b""));
        assert_eq!(line, "CMD_RESP from 10.0.0.5 - FN:7, STAGE:1");
    }

    #[test]
    fn test_short_data_is_quoted_verbatim() {
        let line = describe_response("10.0.0.5", &frame(b"ok"));
        assert_eq!(line, "CMD_RESP from 10.0.0.5 - FN:7, STAGE:1, DATA: 'ok'");
    }

    #[test]
    fn test_exactly_fifty_chars_is_not_truncated() {
        let data = "x".repeat(50);
        let line = describe_response("10.0.0.5", &frame(data.as_bytes()));
        assert!(line.ends_with(&format!("'{data}'")));
    }

    #[test]
    fn test_long_data_is_cut_to_fifty_chars_with_ellipsis() {
        // Arrange
        let data = "abcdefghij".repeat(6);

        // Act
        let line = describe_response("10.0.0.5", &frame(data.as_bytes()));

        // Assert
        let expected = format!("DATA: '{}...'", &data[..50]);
        assert!(line.ends_with(&expected), "got {line}");
    }

    #[test]
    fn test_multibyte_data_is_cut_on_char_boundary() {
        let data = "é".repeat(60);
        let line = describe_response("10.0.0.5", &frame(data.as_bytes()));
        assert!(line.ends_with(&format!("'{}...'", "é".repeat(50))));
    }

    #[test]
    fn test_invalid_utf8_does_not_panic() {
        let line = describe_response("10.0.0.5", &frame(&[0xFF, 0xFE, b'a']));
        assert!(line.contains("DATA: '"));
    }
}
