//! Boundary contracts for the external collaborators
//!
//! The voice core never talks to a backend directly. Each backend sits behind
//! one of these traits so it can be swapped (NATS adapters, offline stubs,
//! scripted fakes in tests). Every call returns a tagged `Result`; callers
//! convert errors into local state changes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, warn};

use crate::audio::AudioBlob;
use crate::conversation::{ConversationMessage, Persona, Scenario};
use crate::error::{FailureSource, Result, VoiceError};

/// Speech-to-text
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe a finished recording. An empty string means nothing was
    /// heard and is not an error at this boundary.
    async fn transcribe(&self, audio: &AudioBlob, language: &str) -> Result<String>;
}

/// Reply produced by the primary response service
#[derive(Debug, Clone, PartialEq)]
pub struct AssistantReply {
    pub text: String,
    /// Scenario suggested by the backend, if any
    pub scenario: Option<Scenario>,
}

impl AssistantReply {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            scenario: None,
        }
    }
}

/// Chat completion backend
#[async_trait]
pub trait ResponseService: Send + Sync {
    /// Prepare the backend (create assistant, thread, ...). Called at startup
    /// and on every reconnect.
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    /// Reply to `text`. `history` holds the turns before this one.
    async fn respond(
        &self,
        text: &str,
        history: &[ConversationMessage],
        scenario: Scenario,
    ) -> Result<AssistantReply>;
}

/// Parameters for voice rendering
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoiceParams {
    pub voice: String,
    pub scenario: Scenario,
}

impl VoiceParams {
    pub fn for_persona(persona: &Persona, scenario: Scenario) -> Self {
        Self {
            voice: persona.voice().to_string(),
            scenario,
        }
    }
}

/// Text-to-speech
#[async_trait]
pub trait VoiceRenderer: Send + Sync {
    async fn synthesize(&self, text: &str, params: &VoiceParams) -> Result<Vec<u8>>;
}

/// Diagnostic event emitted for every recorded failure
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticEvent {
    pub source: FailureSource,
    pub message: String,
    pub retry_count: u32,
    pub fallback_mode: bool,
    pub timestamp: DateTime<Utc>,
}

/// Fire-and-forget diagnostics
///
/// Implementations must not block and must swallow their own failures.
pub trait DiagnosticSink: Send + Sync {
    fn log(&self, event: DiagnosticEvent);
}

/// Writes diagnostic events to the `diagnostics` tracing target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn log(&self, event: DiagnosticEvent) {
        if event.fallback_mode {
            error!(
                target: "diagnostics",
                source = %event.source,
                retry_count = event.retry_count,
                fallback_mode = event.fallback_mode,
                "{}",
                event.message
            );
        } else {
            warn!(
                target: "diagnostics",
                source = %event.source,
                retry_count = event.retry_count,
                fallback_mode = event.fallback_mode,
                "{}",
                event.message
            );
        }
    }
}

/// Used when no transcription backend is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineTranscriber;

#[async_trait]
impl Transcriber for OfflineTranscriber {
    async fn transcribe(&self, _audio: &AudioBlob, _language: &str) -> Result<String> {
        Err(VoiceError::Transcription(
            "no transcription backend configured".to_string(),
        ))
    }
}

/// Used when no response backend is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineResponder;

#[async_trait]
impl ResponseService for OfflineResponder {
    async fn initialize(&self) -> Result<()> {
        Err(VoiceError::response_init("no response backend configured"))
    }

    async fn respond(
        &self,
        _text: &str,
        _history: &[ConversationMessage],
        _scenario: Scenario,
    ) -> Result<AssistantReply> {
        Err(VoiceError::response("no response backend configured"))
    }
}

/// Used when no voice backend is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineRenderer;

#[async_trait]
impl VoiceRenderer for OfflineRenderer {
    async fn synthesize(&self, _text: &str, _params: &VoiceParams) -> Result<Vec<u8>> {
        Err(VoiceError::Render("no voice backend configured".to_string()))
    }
}
