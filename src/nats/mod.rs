//! NATS adapters for the external services
//!
//! Subjects are `<prefix>.<endpoint>`:
//! - `stt.transcribe`: recording in, text out
//! - `chat.respond` / `chat.status`: response service
//! - `tts.synthesize`: voice rendering
//! - `diagnostics`: fire-and-forget failure events

pub mod client;
pub mod gateway;
pub mod messages;

pub use client::NatsClient;
pub use gateway::{NatsDiagnosticSink, NatsResponder, NatsTranscriber, NatsVoiceRenderer};
pub use messages::{ChatReply, ChatRequest, HistoryEntry, ServiceReply, TranscribeRequest};
