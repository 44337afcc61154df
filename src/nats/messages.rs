use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::conversation::{ConversationMessage, Scenario};

pub const TRANSCRIBE: &str = "stt.transcribe";
pub const CHAT_RESPOND: &str = "chat.respond";
pub const CHAT_STATUS: &str = "chat.status";
pub const SYNTHESIZE: &str = "tts.synthesize";
pub const DIAGNOSTICS: &str = "diagnostics";

pub fn encode_audio(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

pub fn decode_audio(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    base64::engine::general_purpose::STANDARD.decode(encoded)
}

/// Service reply: either `{"error": "..."}` or the payload
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ServiceReply<T> {
    Error { error: String },
    Ok(T),
}

impl<T> ServiceReply<T> {
    pub fn into_result(self) -> Result<T, String> {
        match self {
            ServiceReply::Ok(value) => Ok(value),
            ServiceReply::Error { error } => Err(error),
        }
    }
}

/// Recording sent to the STT service
#[derive(Debug, Serialize, Deserialize)]
pub struct TranscribeRequest {
    pub session_id: String,
    pub audio: String, // Base64-encoded WAV
    pub mime_type: String,
    pub language: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TranscribeReply {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEntry {
    pub text: String,
    pub is_user: bool,
}

impl From<&ConversationMessage> for HistoryEntry {
    fn from(message: &ConversationMessage) -> Self {
        Self {
            text: message.text.clone(),
            is_user: message.is_user,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    pub session_id: String,
    pub text: String,
    pub scenario: Scenario,
    pub history: Vec<HistoryEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatReply {
    pub text: String,
    #[serde(default)]
    pub scenario: Option<Scenario>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusRequest {
    pub session_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusReply {
    pub ready: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SynthesizeRequest {
    pub text: String,
    pub voice: String,
    pub scenario: Scenario,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SynthesizeReply {
    pub audio: String, // Base64-encoded audio
}
