//! Frame codec for the recognition socket.
//!
//! Two frame kinds share one socket:
//!
//! ```text
//! Text frame   : <header block> CRLF <json payload>
//! Binary frame : <u16 BE header length> <header block> <raw payload bytes>
//! ```
//!
//! A header block is a sequence of `Name: value` lines, each terminated by
//! CRLF. Every outbound block carries `Path`, `X-RequestId`, `X-Timestamp`
//! and `Content-Type`.
//!
//! All functions here are pure apart from reading the clock for
//! `X-Timestamp`. Payloads are never split: one call produces one frame.

use std::io::Cursor;

use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;
use time::macros::format_description;
use tokio_tungstenite::tungstenite::protocol::Message;

use super::config::AudioFormat;
use super::error::FrameError;
use super::messages::{
    CONTENT_TYPE_HEADER, FrameHeaders, PATH_AUDIO, PATH_HEADER, REQUEST_ID_HEADER, RequestId,
    SpeechMessage, TIMESTAMP_HEADER,
};

pub const HEADER_SEPARATOR: &str = "\r\n";

/// Separates the header block from a text payload.
pub const PAYLOAD_SEPARATOR: &str = "\r\n\r\n";

pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Size of the big-endian header length prefix on binary frames.
pub const HEADER_LENGTH_PREFIX: usize = 2;

/// One outbound frame, ready to be written to the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
}

impl Frame {
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Frame> for Message {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => Message::Text(text.into()),
            Frame::Binary(data) => Message::Binary(data),
        }
    }
}

/// Components of a decoded binary frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryFrameParts {
    /// Value of the length prefix.
    pub header_len: u16,
    pub headers: FrameHeaders,
    pub payload: Bytes,
}

// =============================================================================
// Header blocks
// =============================================================================

/// ISO-8601 UTC timestamp with millisecond precision.
pub fn timestamp() -> String {
    let format = format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
    );
    let now = OffsetDateTime::now_utc();
    match now.format(format) {
        Ok(formatted) => formatted,
        // Only reachable for years outside 0..=9999.
        Err(_) => now.unix_timestamp().to_string(),
    }
}

/// The four mandatory headers, in wire order.
pub fn base_headers(path: &str, request_id: &RequestId, content_type: &str) -> FrameHeaders {
    let mut headers = FrameHeaders::new();
    headers.insert(PATH_HEADER, path);
    headers.insert(REQUEST_ID_HEADER, request_id.as_str());
    headers.insert(TIMESTAMP_HEADER, timestamp());
    headers.insert(CONTENT_TYPE_HEADER, content_type);
    headers
}

/// Serialize headers as CRLF-terminated `Name: value` lines.
pub fn header_block(headers: &FrameHeaders) -> String {
    let mut block = String::with_capacity(headers.len() * 48);
    for (name, value) in headers.iter() {
        block.push_str(name);
        block.push_str(": ");
        block.push_str(value);
        block.push_str(HEADER_SEPARATOR);
    }
    block
}

fn parse_headers(text: &str) -> Result<FrameHeaders, FrameError> {
    let mut headers = FrameHeaders::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| FrameError::MalformedHeader(line.to_string()))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(FrameError::MalformedHeader(line.to_string()));
        }
        headers.insert(name, value.trim());
    }
    Ok(headers)
}

// =============================================================================
// Encoding
// =============================================================================

/// Build a text frame carrying `payload` as compact JSON.
pub fn encode_control_frame<T: Serialize + ?Sized>(
    path: &str,
    payload: &T,
    request_id: &RequestId,
) -> Result<Frame, FrameError> {
    let body = serde_json::to_string(payload)
        .map_err(|e| FrameError::MalformedPayload(e.to_string()))?;
    let headers = base_headers(path, request_id, JSON_CONTENT_TYPE);

    let mut frame = header_block(&headers);
    frame.push_str(HEADER_SEPARATOR);
    frame.push_str(&body);
    Ok(Frame::Text(frame))
}

/// Build a binary frame from an arbitrary header set.
pub fn encode_binary_frame(headers: &FrameHeaders, payload: &[u8]) -> Result<Frame, FrameError> {
    let block = header_block(headers);
    let header_len =
        u16::try_from(block.len()).map_err(|_| FrameError::HeaderTooLarge(block.len()))?;

    let mut buffer = BytesMut::with_capacity(HEADER_LENGTH_PREFIX + block.len() + payload.len());
    buffer.put_u16(header_len);
    buffer.put_slice(block.as_bytes());
    buffer.put_slice(payload);
    Ok(Frame::Binary(buffer.freeze()))
}

/// Build an `audio` frame around `audio`, unmodified.
pub fn encode_audio_frame(
    audio: &[u8],
    request_id: &RequestId,
    content_type: &str,
) -> Result<Frame, FrameError> {
    let headers = base_headers(PATH_AUDIO, request_id, content_type);
    encode_binary_frame(&headers, audio)
}

/// RIFF/WAVE header describing a PCM stream of unknown length.
pub fn wav_header(format: &AudioFormat) -> Result<Vec<u8>, FrameError> {
    let spec = hound::WavSpec {
        channels: format.channels,
        sample_rate: format.sample_rate,
        bits_per_sample: format.bits_per_sample,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    let writer = hound::WavWriter::new(&mut cursor, spec)
        .map_err(|e| FrameError::InvalidAudioFormat(e.to_string()))?;
    writer
        .finalize()
        .map_err(|e| FrameError::InvalidAudioFormat(e.to_string()))?;
    Ok(cursor.into_inner())
}

/// The `audio` frame that starts the service's audio pipeline.
///
/// Its payload is a WAV header for `format`; the raw PCM that follows in
/// later frames continues that stream.
pub fn encode_priming_frame(
    format: &AudioFormat,
    request_id: &RequestId,
    content_type: &str,
) -> Result<Frame, FrameError> {
    let header = wav_header(format)?;
    encode_audio_frame(&header, request_id, content_type)
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode an inbound text frame.
///
/// An empty payload decodes to `{}`.
pub fn decode_frame(raw: &str) -> Result<SpeechMessage, FrameError> {
    let (header_text, payload_text) = raw.split_once(PAYLOAD_SEPARATOR).unwrap_or((raw, ""));

    let headers = parse_headers(header_text)?;

    let payload_text = payload_text.trim();
    let payload = if payload_text.is_empty() {
        Value::Object(serde_json::Map::new())
    } else {
        serde_json::from_str(payload_text)
            .map_err(|e| FrameError::MalformedPayload(e.to_string()))?
    };

    Ok(SpeechMessage { headers, payload })
}

/// Split a binary frame into its length prefix, headers and payload.
pub fn decode_binary_frame(raw: &[u8]) -> Result<BinaryFrameParts, FrameError> {
    if raw.len() < HEADER_LENGTH_PREFIX {
        return Err(FrameError::Truncated {
            expected: HEADER_LENGTH_PREFIX,
            actual: raw.len(),
        });
    }

    let header_len = u16::from_be_bytes([raw[0], raw[1]]);
    let header_end = HEADER_LENGTH_PREFIX + header_len as usize;
    if raw.len() < header_end {
        return Err(FrameError::Truncated {
            expected: header_end,
            actual: raw.len(),
        });
    }

    let header_text = std::str::from_utf8(&raw[HEADER_LENGTH_PREFIX..header_end])
        .map_err(|e| FrameError::MalformedHeader(format!("header block is not UTF-8: {e}")))?;

    Ok(BinaryFrameParts {
        header_len,
        headers: parse_headers(header_text)?,
        payload: Bytes::copy_from_slice(&raw[header_end..]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::speech::messages::{PATH_SPEECH_CONFIG, PATH_SPEECH_HYPOTHESIS};
    use serde_json::json;

    fn text(frame: Frame) -> String {
        match frame {
            Frame::Text(text) => text,
            Frame::Binary(_) => panic!("expected text frame"),
        }
    }

    fn binary(frame: Frame) -> Bytes {
        match frame {
            Frame::Binary(data) => data,
            Frame::Text(_) => panic!("expected binary frame"),
        }
    }

    #[test]
    fn test_timestamp_format() {
        let ts = timestamp();
        // 2024-01-01T00:00:00.000Z
        assert_eq!(ts.len(), 24);
        assert!(ts.ends_with('Z'));
        assert_eq!(&ts[10..11], "T");
    }

    #[test]
    fn test_control_frame_layout() {
        let id = RequestId::generate();
        let raw = text(encode_control_frame(PATH_SPEECH_CONFIG, &json!({"a": 1}), &id).unwrap());

        let (headers, body) = raw.split_once(PAYLOAD_SEPARATOR).unwrap();
        assert_eq!(body, r#"{"a":1}"#);

        let lines: Vec<&str> = headers.split(HEADER_SEPARATOR).collect();
        assert_eq!(lines[0], "Path: speech.config");
        assert_eq!(lines[1], format!("X-RequestId: {id}"));
        assert!(lines[2].starts_with("X-Timestamp: "));
        assert_eq!(lines[3], "Content-Type: application/json; charset=utf-8");
    }

    #[test]
    fn test_control_frame_round_trip() {
        let id = RequestId::generate();
        let payload = json!({
            "context": {"system": {"version": "2.0"}, "nested": [1, 2, {"x": null}]},
            "text": "line\r\n\r\nbreak"
        });
        let raw = text(encode_control_frame("speech.context", &payload, &id).unwrap());

        let decoded = decode_frame(&raw).unwrap();
        assert_eq!(decoded.payload, payload);
        assert_eq!(decoded.path(), Some("speech.context"));
        assert_eq!(decoded.headers.request_id(), Some(id.as_str()));
    }

    #[test]
    fn test_audio_frame_round_trip() {
        let id = RequestId::generate();
        let audio: Vec<u8> = (0..=255u8).cycle().take(3200).collect();
        let data = binary(encode_audio_frame(&audio, &id, "audio/x-wav").unwrap());

        let header_len = u16::from_be_bytes([data[0], data[1]]) as usize;
        let block = std::str::from_utf8(&data[2..2 + header_len]).unwrap();
        assert!(block.starts_with("Path: audio\r\n"));
        assert!(block.ends_with("Content-Type: audio/x-wav\r\n"));
        assert_eq!(&data[2 + header_len..], audio.as_slice());

        let parts = decode_binary_frame(&data).unwrap();
        assert_eq!(parts.header_len as usize, header_len);
        assert_eq!(parts.headers.path(), Some(PATH_AUDIO));
        assert_eq!(parts.payload.as_ref(), audio.as_slice());
    }

    #[test]
    fn test_empty_audio_payload() {
        let id = RequestId::generate();
        let data = binary(encode_audio_frame(&[], &id, "audio/x-wav").unwrap());
        let parts = decode_binary_frame(&data).unwrap();
        assert!(parts.payload.is_empty());
        assert_eq!(data.len(), HEADER_LENGTH_PREFIX + parts.header_len as usize);
    }

    #[test]
    fn test_header_too_large() {
        let mut headers = FrameHeaders::new();
        headers.insert("Path", "x".repeat(u16::MAX as usize));
        let err = encode_binary_frame(&headers, b"audio").unwrap_err();
        assert!(matches!(err, FrameError::HeaderTooLarge(len) if len > u16::MAX as usize));
    }

    #[test]
    fn test_header_at_limit_is_accepted() {
        // "Path: " + value + CRLF == 65535 bytes
        let mut headers = FrameHeaders::new();
        headers.insert("Path", "x".repeat(u16::MAX as usize - 8));
        let data = binary(encode_binary_frame(&headers, b"pcm").unwrap());
        let parts = decode_binary_frame(&data).unwrap();
        assert_eq!(parts.header_len, u16::MAX);
        assert_eq!(parts.payload.as_ref(), b"pcm");
    }

    #[test]
    fn test_decode_inbound_hypothesis() {
        let raw = "Path: speech.hypothesis\r\nX-RequestId: deadbeef\r\n\r\n{\"text\":\"hi\"}";
        let message = decode_frame(raw).unwrap();
        assert_eq!(message.headers.len(), 2);
        assert_eq!(message.headers.get("Path"), Some(PATH_SPEECH_HYPOTHESIS));
        assert_eq!(message.headers.get("X-RequestId"), Some("deadbeef"));
        assert_eq!(message.payload, json!({"text": "hi"}));
    }

    #[test]
    fn test_decode_trims_whitespace_and_keeps_colons_in_values() {
        let raw = "  Path :  turn.start \r\nX-Timestamp: 2024-01-01T00:00:00.000Z\r\n\r\n";
        let message = decode_frame(raw).unwrap();
        assert_eq!(message.path(), Some("turn.start"));
        assert_eq!(message.headers.get("X-Timestamp"), Some("2024-01-01T00:00:00.000Z"));
        assert_eq!(message.payload, json!({}));
    }

    #[test]
    fn test_decode_without_separator_has_empty_payload() {
        let message = decode_frame("Path: turn.end\r\n").unwrap();
        assert_eq!(message.path(), Some("turn.end"));
        assert_eq!(message.payload, json!({}));
    }

    #[test]
    fn test_decode_malformed_header() {
        let err = decode_frame("Path speech.phrase\r\n\r\n{}").unwrap_err();
        assert_eq!(err, FrameError::MalformedHeader("Path speech.phrase".to_string()));
    }

    #[test]
    fn test_decode_malformed_payload() {
        let err = decode_frame("Path: speech.phrase\r\n\r\n{not json").unwrap_err();
        assert!(matches!(err, FrameError::MalformedPayload(_)));
    }

    #[test]
    fn test_decode_binary_truncated() {
        assert_eq!(
            decode_binary_frame(&[0]).unwrap_err(),
            FrameError::Truncated { expected: 2, actual: 1 }
        );
        assert_eq!(
            decode_binary_frame(&[0, 10, b'P']).unwrap_err(),
            FrameError::Truncated { expected: 12, actual: 3 }
        );
    }

    #[test]
    fn test_wav_header_describes_format() {
        let format = AudioFormat {
            sample_rate: 8000,
            channels: 1,
            bits_per_sample: 16,
        };
        let header = wav_header(&format).unwrap();
        assert_eq!(header.len(), 44);
        assert_eq!(&header[0..4], b"RIFF");
        assert_eq!(&header[8..12], b"WAVE");
        assert_eq!(u32::from_le_bytes([header[24], header[25], header[26], header[27]]), 8000);
        assert_eq!(u16::from_le_bytes([header[22], header[23]]), 1);
    }

    #[test]
    fn test_priming_frame_carries_wav_header() {
        let id = RequestId::generate();
        let data = binary(
            encode_priming_frame(&AudioFormat::default(), &id, "audio/x-wav").unwrap(),
        );
        let parts = decode_binary_frame(&data).unwrap();
        assert_eq!(parts.headers.path(), Some(PATH_AUDIO));
        assert_eq!(parts.headers.request_id(), Some(id.as_str()));
        assert_eq!(&parts.payload[0..4], b"RIFF");
    }

    #[test]
    fn test_frame_into_message() {
        let message: Message = Frame::Text("Path: x\r\n".into()).into();
        assert!(message.is_text());
        let message: Message = Frame::Binary(Bytes::from_static(b"\x00\x00")).into();
        assert!(message.is_binary());
    }
}
