//! Wire protocol shared by the browser client and the upstream service.
//!
//! Both sides speak JSON over WebSocket. The upstream service has shipped two
//! field-naming conventions (`setupComplete` and `setup_complete`, and so on);
//! every upstream message is normalized into [`UpstreamMessage`] here, before
//! any relay logic looks at it. The canonical internal spelling is camelCase.
//!
//! Frames are never rewritten, with one exception: the setup frame gets the
//! recalled-memory clause appended by [`splice_instruction`].

use serde::Deserialize;
use serde::de::IgnoredAny;
use serde_json::Value;

use crate::constants::SYSTEM_TRIGGER_PREFIX;
use crate::errors::{ProtocolError, Result};

/// Raw-text marker used when a frame does not parse as JSON.
const SETUP_MARKER: &str = "\"setup\":";

/// One WebSocket payload, kept byte-for-byte.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 text frame.
    Text(String),
    /// Binary frame.
    Binary(Vec<u8>),
}

impl Frame {
    /// The payload as text, if it is a text frame or valid UTF-8 binary.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text.as_str()),
            Self::Binary(bytes) => std::str::from_utf8(bytes).ok(),
        }
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(bytes) => bytes.len(),
        }
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Client → upstream
// ─────────────────────────────────────────────────────────────────────────────

/// How the relay treats a client frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientFrameKind {
    /// Carries the `setup` marker.
    Configuration,
    /// Anything else. `user_text` is the first text part of a client turn,
    /// when present and not a synthesized trigger.
    Content {
        /// User-authored text worth logging.
        user_text: Option<String>,
    },
}

impl ClientFrameKind {
    /// Classify a client frame.
    pub fn of(frame: &Frame) -> Self {
        frame
            .as_text()
            .map_or(Self::Content { user_text: None }, Self::of_text)
    }

    /// Classify a client text payload.
    pub fn of_text(text: &str) -> Self {
        match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) if map.contains_key("setup") => Self::Configuration,
            Ok(value) => Self::Content {
                user_text: client_turn_text(&value),
            },
            Err(_) if text.contains(SETUP_MARKER) => Self::Configuration,
            Err(_) => Self::Content { user_text: None },
        }
    }
}

fn client_turn_text(value: &Value) -> Option<String> {
    value
        .pointer("/clientContent/turns/0/parts/0/text")
        .or_else(|| value.pointer("/client_content/turns/0/parts/0/text"))
        .and_then(Value::as_str)
        .filter(|text| !text.starts_with(SYSTEM_TRIGGER_PREFIX) && !text.trim().is_empty())
        .map(str::to_owned)
}

/// Append `clause` to `setup.systemInstruction.parts[0].text`.
///
/// Every other member of the frame is preserved, in its original order.
pub fn splice_instruction(frame: &str, clause: &str) -> Result<String> {
    let mut value: Value = serde_json::from_str(frame)?;
    let part = value
        .get_mut("setup")
        .and_then(|setup| {
            if setup.get("systemInstruction").is_some() {
                setup.get_mut("systemInstruction")
            } else {
                setup.get_mut("system_instruction")
            }
        })
        .and_then(|instruction| instruction.get_mut("parts"))
        .and_then(|parts| parts.get_mut(0))
        .and_then(Value::as_object_mut)
        .ok_or(ProtocolError::MissingInstruction)?;

    let existing = part.get("text").and_then(Value::as_str).unwrap_or_default();
    let text = format!("{existing}{clause}");
    let _ = part.insert("text".to_owned(), Value::String(text));
    Ok(serde_json::to_string(&value)?)
}

// ─────────────────────────────────────────────────────────────────────────────
// Upstream → client
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawServerMessage {
    #[serde(alias = "setup_complete")]
    setup_complete: Option<IgnoredAny>,
    #[serde(alias = "server_content")]
    server_content: Option<RawServerContent>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawServerContent {
    #[serde(alias = "model_turn")]
    model_turn: Option<RawModelTurn>,
    #[serde(alias = "output_transcription")]
    output_transcription: Option<RawTranscription>,
    interrupted: Option<bool>,
    #[serde(alias = "turn_complete")]
    turn_complete: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawModelTurn {
    parts: Vec<RawPart>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPart {
    text: Option<String>,
    thought: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawTranscription {
    text: Option<String>,
}

/// Normalized view of one upstream message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UpstreamMessage {
    /// Readiness acknowledgment.
    pub setup_complete: bool,
    /// Spoken or written model text, reasoning parts excluded.
    pub text: Option<String>,
    /// The model was interrupted by the user.
    pub interrupted: bool,
    /// The model finished its turn.
    pub turn_complete: bool,
}

impl UpstreamMessage {
    /// Parse an upstream payload. Returns `None` for anything that is not a
    /// JSON object of the expected shape; such frames are still relayed.
    pub fn parse(text: &str) -> Option<Self> {
        let raw: RawServerMessage = serde_json::from_str(text).ok()?;
        let content = raw.server_content.unwrap_or_default();

        let turn_text: String = content
            .model_turn
            .map(|turn| {
                turn.parts
                    .into_iter()
                    .filter(|part| !part.thought.unwrap_or(false))
                    .filter_map(|part| part.text)
                    .collect()
            })
            .unwrap_or_default();
        let text = if turn_text.is_empty() {
            content.output_transcription.and_then(|t| t.text)
        } else {
            Some(turn_text)
        };

        Some(Self {
            setup_complete: raw.setup_complete.is_some(),
            text: text.filter(|t| !t.is_empty()),
            interrupted: content.interrupted.unwrap_or(false),
            turn_complete: content.turn_complete.unwrap_or(false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SETUP: &str = r#"{"setup":{"model":"models/live","generationConfig":{"responseModalities":["AUDIO"]},"systemInstruction":{"parts":[{"text":"Be kind."}]},"tools":[]}}"#;

    #[test]
    fn setup_frame_is_configuration() {
        assert_eq!(ClientFrameKind::of_text(SETUP), ClientFrameKind::Configuration);
    }

    #[test]
    fn unparseable_frame_with_marker_is_configuration() {
        let text = r#"{"setup": {"model": "x"},"#;
        assert_eq!(ClientFrameKind::of_text(text), ClientFrameKind::Configuration);
    }

    #[test]
    fn setup_mentioned_inside_user_text_is_content() {
        let text = r#"{"clientContent":{"turns":[{"role":"user","parts":[{"text":"what does \"setup\": mean?"}]}],"turnComplete":true}}"#;
        let ClientFrameKind::Content { user_text } = ClientFrameKind::of_text(text) else {
            panic!("expected content");
        };
        assert_eq!(user_text.as_deref(), Some("what does \"setup\": mean?"));
    }

    #[test]
    fn client_turn_text_in_both_spellings() {
        let camel = r#"{"clientContent":{"turns":[{"parts":[{"text":"hi"}]}]}}"#;
        let snake = r#"{"client_content":{"turns":[{"parts":[{"text":"hi"}]}]}}"#;
        for text in [camel, snake] {
            assert_eq!(
                ClientFrameKind::of_text(text),
                ClientFrameKind::Content {
                    user_text: Some("hi".into())
                }
            );
        }
    }

    #[test]
    fn system_trigger_is_not_user_text() {
        let text = r#"{"clientContent":{"turns":[{"role":"user","parts":[{"text":"[SYSTEM]: Connection established."}]}],"turnComplete":true}}"#;
        assert_eq!(
            ClientFrameKind::of_text(text),
            ClientFrameKind::Content { user_text: None }
        );
    }

    #[test]
    fn media_chunk_has_no_user_text() {
        let text = r#"{"realtimeInput":{"mediaChunks":[{"mimeType":"audio/pcm;rate=16000","data":"AAAA"}]}}"#;
        assert_eq!(
            ClientFrameKind::of_text(text),
            ClientFrameKind::Content { user_text: None }
        );
    }

    #[test]
    fn non_utf8_binary_is_content() {
        let frame = Frame::Binary(vec![0xff, 0xfe, 0x00]);
        assert_eq!(
            ClientFrameKind::of(&frame),
            ClientFrameKind::Content { user_text: None }
        );
    }

    #[test]
    fn utf8_binary_is_classified_as_text() {
        let frame = Frame::Binary(SETUP.as_bytes().to_vec());
        assert_eq!(ClientFrameKind::of(&frame), ClientFrameKind::Configuration);
    }

    #[test]
    fn splice_appends_to_first_part_only() {
        let spliced = splice_instruction(SETUP, "\nREMEMBER: x").unwrap();
        let value: Value = serde_json::from_str(&spliced).unwrap();
        assert_eq!(
            value["setup"]["systemInstruction"]["parts"][0]["text"],
            "Be kind.\nREMEMBER: x"
        );
        assert_eq!(value["setup"]["model"], "models/live");
        assert_eq!(
            value["setup"]["generationConfig"]["responseModalities"][0],
            "AUDIO"
        );
    }

    #[test]
    fn splice_preserves_member_order() {
        let spliced = splice_instruction(SETUP, "!").unwrap();
        let model = spliced.find("\"model\"").unwrap();
        let config = spliced.find("\"generationConfig\"").unwrap();
        let tools = spliced.find("\"tools\"").unwrap();
        assert!(model < config && config < tools, "{spliced}");
    }

    #[test]
    fn splice_accepts_snake_case_instruction() {
        let frame = r#"{"setup":{"system_instruction":{"parts":[{"text":"a"}]}}}"#;
        let spliced = splice_instruction(frame, "b").unwrap();
        assert!(spliced.contains("\"text\":\"ab\""), "{spliced}");
    }

    #[test]
    fn splice_without_instruction_fails() {
        let frame = r#"{"setup":{"model":"m"}}"#;
        assert!(matches!(
            splice_instruction(frame, "x"),
            Err(ProtocolError::MissingInstruction)
        ));
    }

    #[test]
    fn splice_of_invalid_json_fails() {
        assert!(matches!(
            splice_instruction("{\"setup\":", "x"),
            Err(ProtocolError::Json(_))
        ));
    }

    #[test]
    fn setup_complete_in_both_spellings() {
        for text in [r#"{"setupComplete":{}}"#, r#"{"setup_complete":{}}"#] {
            let msg = UpstreamMessage::parse(text).unwrap();
            assert!(msg.setup_complete, "{text}");
        }
    }

    #[test]
    fn model_turn_text_skips_thoughts() {
        let text = r#"{"serverContent":{"modelTurn":{"parts":[{"text":"thinking...","thought":true},{"text":"Hello"}]}}}"#;
        let msg = UpstreamMessage::parse(text).unwrap();
        assert_eq!(msg.text.as_deref(), Some("Hello"));
        assert!(!msg.setup_complete);
    }

    #[test]
    fn transcription_is_the_fallback_text() {
        let text = r#"{"server_content":{"output_transcription":{"text":"spoken words"}}}"#;
        let msg = UpstreamMessage::parse(text).unwrap();
        assert_eq!(msg.text.as_deref(), Some("spoken words"));
    }

    #[test]
    fn audio_only_turn_has_no_text() {
        let text = r#"{"serverContent":{"modelTurn":{"parts":[{"inlineData":{"mimeType":"audio/pcm","data":"AAA="}}]}}}"#;
        let msg = UpstreamMessage::parse(text).unwrap();
        assert_eq!(msg.text, None);
    }

    #[test]
    fn interruption_and_turn_complete_signals() {
        let msg = UpstreamMessage::parse(r#"{"serverContent":{"interrupted":true}}"#).unwrap();
        assert!(msg.interrupted);
        let msg = UpstreamMessage::parse(r#"{"server_content":{"turn_complete":true}}"#).unwrap();
        assert!(msg.turn_complete);
    }

    #[test]
    fn non_object_is_opaque() {
        assert!(UpstreamMessage::parse("not json").is_none());
        assert!(UpstreamMessage::parse("42").is_none());
    }

    #[test]
    fn frame_len_and_text() {
        assert_eq!(Frame::Text("abc".into()).len(), 3);
        assert!(Frame::Binary(Vec::new()).is_empty());
        assert_eq!(Frame::Binary(b"ok".to_vec()).as_text(), Some("ok"));
    }
}
