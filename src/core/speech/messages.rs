//! Message types exchanged with the recognition service.
//!
//! Inbound frames decode into a [`SpeechMessage`]: an ordered header block
//! plus a JSON payload. [`RecognitionEvent`] gives typed access to the
//! payloads of the well-known paths.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// Paths
// =============================================================================

/// Header naming the semantic type of a frame.
pub const PATH_HEADER: &str = "Path";
pub const REQUEST_ID_HEADER: &str = "X-RequestId";
pub const TIMESTAMP_HEADER: &str = "X-Timestamp";
pub const CONTENT_TYPE_HEADER: &str = "Content-Type";

pub const PATH_AUDIO: &str = "audio";
pub const PATH_SPEECH_CONFIG: &str = "speech.config";
pub const PATH_SPEECH_START_DETECTED: &str = "speech.startDetected";
pub const PATH_SPEECH_END_DETECTED: &str = "speech.endDetected";
pub const PATH_SPEECH_HYPOTHESIS: &str = "speech.hypothesis";
pub const PATH_SPEECH_PHRASE: &str = "speech.phrase";
pub const PATH_TURN_START: &str = "turn.start";
pub const PATH_TURN_END: &str = "turn.end";

// =============================================================================
// Request identity
// =============================================================================

/// 32 lowercase hex digits, no separators.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(String);

impl RequestId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Header block
// =============================================================================

/// Ordered `name: value` lines of a frame.
///
/// Lookups are case-insensitive on the name; insertion order is kept so an
/// encoded block reads back in the same order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameHeaders(Vec<(String, String)>);

impl FrameHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a header, replacing an existing one with the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(&name)) {
            Some(entry) => entry.1 = value,
            None => self.0.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn path(&self) -> Option<&str> {
        self.get(PATH_HEADER)
    }

    pub fn request_id(&self) -> Option<&str> {
        self.get(REQUEST_ID_HEADER)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FrameHeaders {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}

// =============================================================================
// Decoded message
// =============================================================================

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechMessage {
    pub headers: FrameHeaders,
    /// Parsed JSON body; `{}` when the frame carried no payload.
    pub payload: Value,
}

impl SpeechMessage {
    pub fn path(&self) -> Option<&str> {
        self.headers.path()
    }

    /// Interpret the payload according to the frame's path.
    pub fn event(&self) -> RecognitionEvent {
        RecognitionEvent::from_message(self)
    }

    /// JSON view handed to bridge clients: `{"path": ..., "payload": ...}`.
    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "path": self.path(),
            "request_id": self.headers.request_id(),
            "payload": self.payload,
        })
    }
}

// =============================================================================
// Recognition payloads
// =============================================================================

/// Interim recognition result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Hypothesis {
    pub text: String,
    /// Offset into the audio stream in 100ns ticks.
    #[serde(default)]
    pub offset: u64,
    #[serde(default)]
    pub duration: u64,
}

/// Final recognition result for one phrase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Phrase {
    pub recognition_status: RecognitionStatus,
    #[serde(default)]
    pub display_text: Option<String>,
    #[serde(default)]
    pub offset: u64,
    #[serde(default)]
    pub duration: u64,
}

impl Phrase {
    pub fn is_success(&self) -> bool {
        self.recognition_status == RecognitionStatus::Success
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecognitionStatus {
    Success,
    NoMatch,
    InitialSilenceTimeout,
    BabbleTimeout,
    Error,
    EndOfDictation,
    #[serde(other)]
    Unknown,
}

/// Speech boundary marker (`speech.startDetected` / `speech.endDetected`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SpeechBoundary {
    #[serde(default)]
    pub offset: u64,
}

/// Typed view of a decoded message.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionEvent {
    SpeechStartDetected(SpeechBoundary),
    SpeechEndDetected(SpeechBoundary),
    Hypothesis(Hypothesis),
    Phrase(Phrase),
    TurnStart,
    TurnEnd,
    /// Unknown path, or a known path whose payload did not match.
    Other(Option<String>),
}

impl RecognitionEvent {
    pub fn from_message(message: &SpeechMessage) -> Self {
        let path = message.path();
        let payload = &message.payload;

        let parsed = match path {
            Some(PATH_SPEECH_START_DETECTED) => serde_json::from_value(payload.clone())
                .ok()
                .map(Self::SpeechStartDetected),
            Some(PATH_SPEECH_END_DETECTED) => serde_json::from_value(payload.clone())
                .ok()
                .map(Self::SpeechEndDetected),
            Some(PATH_SPEECH_HYPOTHESIS) => serde_json::from_value(payload.clone())
                .ok()
                .map(Self::Hypothesis),
            Some(PATH_SPEECH_PHRASE) => serde_json::from_value(payload.clone())
                .ok()
                .map(Self::Phrase),
            Some(PATH_TURN_START) => Some(Self::TurnStart),
            Some(PATH_TURN_END) => Some(Self::TurnEnd),
            _ => None,
        };

        parsed.unwrap_or_else(|| Self::Other(path.map(str::to_string)))
    }

    /// Transcript text carried by the event, if any.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Hypothesis(h) => Some(&h.text),
            Self::Phrase(p) => p.display_text.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message(path: &str, payload: Value) -> SpeechMessage {
        SpeechMessage {
            headers: [(PATH_HEADER, path)].into_iter().collect(),
            payload,
        }
    }

    #[test]
    fn test_request_id_format() {
        let id = RequestId::generate();
        assert_eq!(id.as_str().len(), 32);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, RequestId::generate());
    }

    #[test]
    fn test_headers_case_insensitive_and_ordered() {
        let mut headers = FrameHeaders::new();
        headers.insert("Path", "audio");
        headers.insert("X-RequestId", "abc");
        headers.insert("path", "speech.config");

        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get("PATH"), Some("speech.config"));
        let names: Vec<&str> = headers.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["Path", "X-RequestId"]);
    }

    #[test]
    fn test_phrase_event() {
        let msg = message(
            PATH_SPEECH_PHRASE,
            json!({"RecognitionStatus": "Success", "DisplayText": "Hello.", "Offset": 100, "Duration": 2000}),
        );
        match msg.event() {
            RecognitionEvent::Phrase(phrase) => {
                assert!(phrase.is_success());
                assert_eq!(phrase.display_text.as_deref(), Some("Hello."));
                assert_eq!(phrase.duration, 2000);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_unknown_status_and_mismatched_payload() {
        let msg = message(PATH_SPEECH_PHRASE, json!({"RecognitionStatus": "Brand New"}));
        assert!(matches!(
            msg.event(),
            RecognitionEvent::Phrase(Phrase { recognition_status: RecognitionStatus::Unknown, .. })
        ));

        let msg = message(PATH_SPEECH_HYPOTHESIS, json!({"unexpected": true}));
        assert_eq!(
            msg.event(),
            RecognitionEvent::Other(Some(PATH_SPEECH_HYPOTHESIS.to_string()))
        );
    }

    #[test]
    fn test_hypothesis_text_and_turn_events() {
        let msg = message(PATH_SPEECH_HYPOTHESIS, json!({"Text": "hel"}));
        assert_eq!(msg.event().text(), Some("hel"));
        assert_eq!(message(PATH_TURN_END, json!({})).event(), RecognitionEvent::TurnEnd);
        assert_eq!(
            message(PATH_TURN_START, json!({"context": {}})).event(),
            RecognitionEvent::TurnStart
        );
    }

    #[test]
    fn test_to_json_shape() {
        let msg = message(PATH_SPEECH_HYPOTHESIS, json!({"Text": "hi"}));
        let value = msg.to_json();
        assert_eq!(value["path"], "speech.hypothesis");
        assert_eq!(value["payload"]["Text"], "hi");
        assert!(value["request_id"].is_null());
    }
}
