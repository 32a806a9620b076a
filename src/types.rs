//! Wire-level event and configuration types for the realtime voice protocol.
//!
//! Everything travels as JSON text frames with a dotted `type` tag. Outbound
//! events are serde-serialized from [`ClientEvent`]; inbound frames are
//! parsed into [`ServerEvent`], with unrecognized types preserved verbatim in
//! [`ServerEvent::Other`] so subscribers always see the full stream.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RealtimeError;

/// An event the client sends to the realtime service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Session configuration, sent once immediately after the socket opens.
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionConfig },

    /// One captured PCM16 block, base64-encoded.
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioAppend { audio: String },

    /// Finalize the input buffer for the current turn.
    #[serde(rename = "input_audio_buffer.commit")]
    InputAudioCommit,

    /// Ask the agent to produce a response to the committed buffer.
    #[serde(rename = "response.create")]
    ResponseCreate,

    /// Abort the in-flight response (barge-in).
    #[serde(rename = "response.cancel")]
    ResponseCancel,
}

/// Payload of the initial `session.update` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub voice: String,
    pub instructions: String,
    pub input_audio_transcription: TranscriptionConfig,
    pub turn_detection: TurnDetectionConfig,
    pub tools: Vec<ToolConfig>,
    pub audio: AudioConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            voice: "Ara".to_string(),
            instructions: String::new(),
            input_audio_transcription: TranscriptionConfig::default(),
            turn_detection: TurnDetectionConfig::default(),
            tools: Vec::new(),
            audio: AudioConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    pub model: String,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            model: "grok-2-audio".to_string(),
        }
    }
}

/// Server-side voice activity detection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnDetectionConfig {
    #[serde(rename = "type")]
    pub kind: String,
    pub threshold: f64,
    pub prefix_padding_ms: u32,
    pub silence_duration_ms: u32,
}

impl Default for TurnDetectionConfig {
    fn default() -> Self {
        Self {
            kind: "server_vad".to_string(),
            threshold: 0.3,
            prefix_padding_ms: 300,
            silence_duration_ms: 400,
        }
    }
}

/// A tool enabled for the session, e.g. `{"type": "web_search"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolConfig {
    #[serde(rename = "type")]
    pub kind: String,
}

impl ToolConfig {
    pub fn new(kind: impl Into<String>) -> Self {
        Self { kind: kind.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AudioConfig {
    pub input: AudioIoConfig,
    pub output: AudioIoConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AudioIoConfig {
    pub format: PcmFormat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PcmFormat {
    #[serde(rename = "type")]
    pub kind: String,
    pub rate: u32,
}

impl Default for PcmFormat {
    fn default() -> Self {
        Self {
            kind: "audio/pcm".to_string(),
            rate: crate::audio::SESSION_SAMPLE_RATE_HZ,
        }
    }
}

/// An event received from the realtime service.
///
/// Parsed with [`ServerEvent::from_json`]; a frame whose `type` is not one of
/// the known tags lands in [`ServerEvent::Other`] with the raw JSON intact.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// Remote VAD detected the start of user speech.
    SpeechStarted,
    /// Remote VAD detected the end of user speech.
    SpeechStopped,
    /// The agent started producing a response.
    ResponseCreated,
    /// Final transcription of the user's utterance. Some deployments put the
    /// text under `transcript`, others under `text`.
    InputTranscriptionCompleted {
        transcript: Option<String>,
        text: Option<String>,
    },
    /// Incremental transcription of the user's utterance.
    InputTranscriptionDelta { delta: String },
    /// Incremental transcript of the agent's spoken response.
    OutputTranscriptDelta { delta: String },
    /// One base64 PCM16 block of synthesized agent audio.
    OutputAudioDelta { delta: String },
    /// Any other well-formed event, preserved verbatim.
    Other(Value),
}

impl ServerEvent {
    /// Parse a raw text frame. Fails only on malformed JSON; unknown event
    /// types succeed as [`ServerEvent::Other`].
    pub fn from_json(text: &str) -> Result<Self, RealtimeError> {
        let value: Value = serde_json::from_str(text)?;
        Ok(Self::from_value(value))
    }

    pub fn from_value(value: Value) -> Self {
        let field = |name: &str| -> Option<String> {
            value.get(name).and_then(Value::as_str).map(str::to_string)
        };
        match value.get("type").and_then(Value::as_str) {
            Some("input_audio_buffer.speech_started") => ServerEvent::SpeechStarted,
            Some("input_audio_buffer.speech_stopped") => ServerEvent::SpeechStopped,
            Some("response.created") => ServerEvent::ResponseCreated,
            Some("conversation.item.input_audio_transcription.completed") => {
                ServerEvent::InputTranscriptionCompleted {
                    transcript: field("transcript"),
                    text: field("text"),
                }
            }
            Some("conversation.item.input_audio_transcription.delta") => {
                ServerEvent::InputTranscriptionDelta {
                    delta: field("delta").unwrap_or_default(),
                }
            }
            Some("response.output_audio_transcript.delta") => ServerEvent::OutputTranscriptDelta {
                delta: field("delta").unwrap_or_default(),
            },
            Some("response.output_audio.delta") => ServerEvent::OutputAudioDelta {
                delta: field("delta").unwrap_or_default(),
            },
            _ => ServerEvent::Other(value),
        }
    }

    /// The wire tag, for logging.
    pub fn event_type(&self) -> &str {
        match self {
            ServerEvent::SpeechStarted => "input_audio_buffer.speech_started",
            ServerEvent::SpeechStopped => "input_audio_buffer.speech_stopped",
            ServerEvent::ResponseCreated => "response.created",
            ServerEvent::InputTranscriptionCompleted { .. } => {
                "conversation.item.input_audio_transcription.completed"
            }
            ServerEvent::InputTranscriptionDelta { .. } => {
                "conversation.item.input_audio_transcription.delta"
            }
            ServerEvent::OutputTranscriptDelta { .. } => "response.output_audio_transcript.delta",
            ServerEvent::OutputAudioDelta { .. } => "response.output_audio.delta",
            ServerEvent::Other(value) => value
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("unknown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_event_unit_variants_serialize_to_bare_type() {
        let commit = serde_json::to_value(&ClientEvent::InputAudioCommit).unwrap();
        assert_eq!(commit, json!({"type": "input_audio_buffer.commit"}));
        let create = serde_json::to_value(&ClientEvent::ResponseCreate).unwrap();
        assert_eq!(create, json!({"type": "response.create"}));
        let cancel = serde_json::to_value(&ClientEvent::ResponseCancel).unwrap();
        assert_eq!(cancel, json!({"type": "response.cancel"}));
    }

    #[test]
    fn test_audio_append_serializes_payload() {
        let ev = ClientEvent::InputAudioAppend {
            audio: "AAAA".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&ev).unwrap(),
            json!({"type": "input_audio_buffer.append", "audio": "AAAA"})
        );
    }

    #[test]
    fn test_default_session_update_payload() {
        let ev = ClientEvent::SessionUpdate {
            session: SessionConfig::default(),
        };
        let value = serde_json::to_value(&ev).unwrap();
        assert_eq!(value["type"], "session.update");
        let session = &value["session"];
        assert_eq!(session["voice"], "Ara");
        assert_eq!(session["input_audio_transcription"]["model"], "grok-2-audio");
        assert_eq!(session["turn_detection"]["type"], "server_vad");
        assert_eq!(session["turn_detection"]["threshold"], 0.3);
        assert_eq!(session["turn_detection"]["prefix_padding_ms"], 300);
        assert_eq!(session["turn_detection"]["silence_duration_ms"], 400);
        assert_eq!(session["audio"]["input"]["format"]["type"], "audio/pcm");
        assert_eq!(session["audio"]["input"]["format"]["rate"], 24000);
        assert_eq!(session["audio"]["output"]["format"]["rate"], 24000);
    }

    #[test]
    fn test_parse_known_server_events() {
        assert_eq!(
            ServerEvent::from_json(r#"{"type":"input_audio_buffer.speech_started"}"#).unwrap(),
            ServerEvent::SpeechStarted
        );
        assert_eq!(
            ServerEvent::from_json(r#"{"type":"input_audio_buffer.speech_stopped"}"#).unwrap(),
            ServerEvent::SpeechStopped
        );
        assert_eq!(
            ServerEvent::from_json(r#"{"type":"response.created"}"#).unwrap(),
            ServerEvent::ResponseCreated
        );
        assert_eq!(
            ServerEvent::from_json(r#"{"type":"response.output_audio.delta","delta":"UENN"}"#)
                .unwrap(),
            ServerEvent::OutputAudioDelta {
                delta: "UENN".to_string()
            }
        );
    }

    #[test]
    fn test_parse_transcription_completed_either_field() {
        let with_transcript = ServerEvent::from_json(
            r#"{"type":"conversation.item.input_audio_transcription.completed","transcript":"hello"}"#,
        )
        .unwrap();
        assert_eq!(
            with_transcript,
            ServerEvent::InputTranscriptionCompleted {
                transcript: Some("hello".to_string()),
                text: None,
            }
        );
        let with_text = ServerEvent::from_json(
            r#"{"type":"conversation.item.input_audio_transcription.completed","text":"hi"}"#,
        )
        .unwrap();
        assert_eq!(
            with_text,
            ServerEvent::InputTranscriptionCompleted {
                transcript: None,
                text: Some("hi".to_string()),
            }
        );
    }

    #[test]
    fn test_unknown_event_type_preserved_verbatim() {
        let raw = r#"{"type":"rate_limits.updated","rate_limits":[{"name":"requests"}]}"#;
        let ev = ServerEvent::from_json(raw).unwrap();
        match &ev {
            ServerEvent::Other(value) => {
                assert_eq!(value["rate_limits"][0]["name"], "requests");
            }
            other => panic!("expected Other, got {:?}", other),
        }
        assert_eq!(ev.event_type(), "rate_limits.updated");
    }

    #[test]
    fn test_missing_type_field_is_other() {
        let ev = ServerEvent::from_json(r#"{"delta":"abc"}"#).unwrap();
        assert!(matches!(ev, ServerEvent::Other(_)));
        assert_eq!(ev.event_type(), "unknown");
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        assert!(matches!(
            ServerEvent::from_json("{not json"),
            Err(RealtimeError::MalformedEvent(_))
        ));
    }
}
