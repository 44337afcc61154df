use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use super::client::NatsClient;
use super::messages::{
    decode_audio, encode_audio, ChatReply, ChatRequest, HistoryEntry, ServiceReply, StatusReply,
    StatusRequest, SynthesizeReply, SynthesizeRequest, TranscribeReply, TranscribeRequest,
    CHAT_RESPOND, CHAT_STATUS, DIAGNOSTICS, SYNTHESIZE, TRANSCRIBE,
};
use crate::audio::AudioBlob;
use crate::conversation::{ConversationMessage, Scenario};
use crate::error::{Result, VoiceError};
use crate::gateway::{
    AssistantReply, DiagnosticEvent, DiagnosticSink, ResponseService, Transcriber, VoiceParams,
    VoiceRenderer,
};

pub struct NatsTranscriber {
    client: Arc<NatsClient>,
    session_id: String,
}

impl NatsTranscriber {
    pub fn new(client: Arc<NatsClient>, session_id: impl Into<String>) -> Self {
        Self {
            client,
            session_id: session_id.into(),
        }
    }
}

#[async_trait]
impl Transcriber for NatsTranscriber {
    async fn transcribe(&self, audio: &AudioBlob, language: &str) -> Result<String> {
        let request = TranscribeRequest {
            session_id: self.session_id.clone(),
            audio: encode_audio(&audio.bytes),
            mime_type: audio.mime_type.to_string(),
            language: language.to_string(),
        };

        let reply: ServiceReply<TranscribeReply> = self
            .client
            .request_json(TRANSCRIBE, &request)
            .await
            .map_err(|e| VoiceError::Transcription(format!("{:#}", e)))?;

        let reply = reply.into_result().map_err(VoiceError::Transcription)?;
        debug!("Transcribed {} bytes into {} chars", audio.len(), reply.text.len());
        Ok(reply.text)
    }
}

pub struct NatsResponder {
    client: Arc<NatsClient>,
    session_id: String,
}

impl NatsResponder {
    pub fn new(client: Arc<NatsClient>, session_id: impl Into<String>) -> Self {
        Self {
            client,
            session_id: session_id.into(),
        }
    }
}

#[async_trait]
impl ResponseService for NatsResponder {
    async fn initialize(&self) -> Result<()> {
        let request = StatusRequest {
            session_id: self.session_id.clone(),
        };

        let reply: ServiceReply<StatusReply> = self
            .client
            .request_json(CHAT_STATUS, &request)
            .await
            .map_err(|e| VoiceError::response_init(format!("{:#}", e)))?;

        let status = reply.into_result().map_err(VoiceError::response_init)?;
        if !status.ready {
            return Err(VoiceError::response_init("response service is not ready"));
        }
        Ok(())
    }

    async fn respond(
        &self,
        text: &str,
        history: &[ConversationMessage],
        scenario: Scenario,
    ) -> Result<AssistantReply> {
        let request = ChatRequest {
            session_id: self.session_id.clone(),
            text: text.to_string(),
            scenario,
            history: history.iter().map(HistoryEntry::from).collect(),
        };

        let reply: ServiceReply<ChatReply> = self
            .client
            .request_json(CHAT_RESPOND, &request)
            .await
            .map_err(|e| VoiceError::response(format!("{:#}", e)))?;

        let reply = reply.into_result().map_err(VoiceError::response)?;
        Ok(AssistantReply {
            text: reply.text,
            scenario: reply.scenario,
        })
    }
}

pub struct NatsVoiceRenderer {
    client: Arc<NatsClient>,
}

impl NatsVoiceRenderer {
    pub fn new(client: Arc<NatsClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl VoiceRenderer for NatsVoiceRenderer {
    async fn synthesize(&self, text: &str, params: &VoiceParams) -> Result<Vec<u8>> {
        let request = SynthesizeRequest {
            text: text.to_string(),
            voice: params.voice.clone(),
            scenario: params.scenario,
        };

        let reply: ServiceReply<SynthesizeReply> = self
            .client
            .request_json(SYNTHESIZE, &request)
            .await
            .map_err(|e| VoiceError::Render(format!("{:#}", e)))?;

        let reply = reply.into_result().map_err(VoiceError::Render)?;
        decode_audio(&reply.audio)
            .map_err(|e| VoiceError::Render(format!("invalid audio payload: {}", e)))
    }
}

/// Publishes diagnostic events on a background task
pub struct NatsDiagnosticSink {
    client: Arc<NatsClient>,
}

impl NatsDiagnosticSink {
    pub fn new(client: Arc<NatsClient>) -> Self {
        Self { client }
    }
}

impl DiagnosticSink for NatsDiagnosticSink {
    fn log(&self, event: DiagnosticEvent) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("No runtime, dropping diagnostic event: {}", event.message);
            return;
        };

        let client = self.client.clone();
        handle.spawn(async move {
            if let Err(e) = client.publish_json(DIAGNOSTICS, &event).await {
                warn!("Failed to publish diagnostic event: {:#}", e);
            }
        });
    }
}
