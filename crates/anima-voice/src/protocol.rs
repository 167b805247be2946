//! Wire events for the duplex conversation channel.
//!
//! Events travel as internally-tagged JSON objects. Outgoing audio is one
//! complete base64 WAV per push-to-talk utterance, followed by a flush
//! marker once the data has had time to land.

use crate::error::{VoiceError, VoiceResult};
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Events emitted to the remote service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Session announcement, sent once after the channel opens.
    Init { chat_id: String, voice_id: String },

    /// One complete utterance: base64 WAV at the wire rate.
    AudioData {
        audio: String,
        sample_rate: u32,
        encoding: String,
    },

    /// End-of-utterance marker, sent shortly after the audio itself.
    AudioFlush,
}

/// Events received from the remote service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Remote is prepared to receive audio.
    Ready,

    /// One synthesized speech segment (base64 WAV), to be queued for playback.
    TtsAudio { audio: String },

    /// Synthesis finished for the current reply. Informational.
    TtsComplete,

    /// Select the avatar's active emotion.
    Expression { expression: String },

    ConnectError { message: String },

    Disconnect {
        #[serde(default)]
        reason: Option<String>,
    },
}

impl ServerEvent {
    /// Parse one incoming text frame.
    ///
    /// Besides the tagged object form, the expression event may arrive as a
    /// bare JSON string naming the emotion; both decode to `Expression`.
    pub fn parse(text: &str) -> VoiceResult<ServerEvent> {
        if let Ok(event) = serde_json::from_str::<ServerEvent>(text) {
            return Ok(event);
        }
        if let Ok(name) = serde_json::from_str::<String>(text) {
            return Ok(ServerEvent::Expression { expression: name });
        }
        Err(VoiceError::Channel(format!(
            "unrecognized server event: {}",
            text
        )))
    }
}

/// Encode payload bytes for an `audio_data` / `tts_audio` field.
pub fn encode_audio_field(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Decode an `audio_data` / `tts_audio` field back to container bytes.
pub fn decode_audio_field(field: &str) -> VoiceResult<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(field)
        .map_err(|e| VoiceError::Decode(format!("base64: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_events_serialize_with_wire_names() {
        let init = ClientEvent::Init {
            chat_id: "42".to_string(),
            voice_id: "alloy".to_string(),
        };
        let json = serde_json::to_value(&init).unwrap();
        assert_eq!(json["type"], "init");
        assert_eq!(json["chat_id"], "42");
        assert_eq!(json["voice_id"], "alloy");

        let flush = serde_json::to_value(&ClientEvent::AudioFlush).unwrap();
        assert_eq!(flush["type"], "audio_flush");
    }

    #[test]
    fn audio_data_carries_rate_and_encoding() {
        let event = ClientEvent::AudioData {
            audio: "AAAA".to_string(),
            sample_rate: 16_000,
            encoding: "audio/wav".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "audio_data");
        assert_eq!(json["sample_rate"], 16_000);
        assert_eq!(json["encoding"], "audio/wav");
    }

    #[test]
    fn server_events_parse_from_tagged_form() {
        assert_eq!(
            ServerEvent::parse(r#"{"type":"ready"}"#).unwrap(),
            ServerEvent::Ready
        );
        assert_eq!(
            ServerEvent::parse(r#"{"type":"expression","expression":"happy"}"#).unwrap(),
            ServerEvent::Expression {
                expression: "happy".to_string()
            }
        );
        assert_eq!(
            ServerEvent::parse(r#"{"type":"disconnect"}"#).unwrap(),
            ServerEvent::Disconnect { reason: None }
        );
    }

    #[test]
    fn bare_string_is_an_expression() {
        assert_eq!(
            ServerEvent::parse(r#""surprised""#).unwrap(),
            ServerEvent::Expression {
                expression: "surprised".to_string()
            }
        );
    }

    #[test]
    fn garbage_is_a_channel_error() {
        assert!(ServerEvent::parse("{{nope").is_err());
    }

    #[test]
    fn audio_field_round_trips() {
        let bytes = vec![0u8, 1, 2, 250, 255];
        let field = encode_audio_field(&bytes);
        assert_eq!(decode_audio_field(&field).unwrap(), bytes);
    }
}
