pub mod assistant;
pub mod audio;
pub mod config;
pub mod conversation;
pub mod error;
pub mod failure;
pub mod gateway;
pub mod nats;
pub mod notice;
pub mod orchestrator;
pub mod recording;
pub mod timer;
pub mod vad;

pub use assistant::{AssistantCommand, AssistantUpdate, VoiceAssistant};
pub use audio::{
    assemble_wav, AudioBlob, AudioFile, AudioFrame, AudioLevelMonitor, FileMicrophone,
    MicrophoneFeed, MicrophoneSource, MicrophoneStream,
};
pub use config::Config;
pub use conversation::{
    classify, ConversationHistory, ConversationMessage, KeyValueStore, MemoryStore, Persona,
    Scenario, SessionContext, Transcript,
};
pub use error::{FailureSource, Result, VoiceError};
pub use failure::{FailureState, FailureTracker};
pub use gateway::{
    AssistantReply, DiagnosticEvent, DiagnosticSink, OfflineRenderer, OfflineResponder,
    OfflineTranscriber, ResponseService, TracingSink, Transcriber, VoiceParams, VoiceRenderer,
};
pub use nats::{NatsClient, NatsDiagnosticSink, NatsResponder, NatsTranscriber, NatsVoiceRenderer};
pub use notice::Notice;
pub use orchestrator::{DeliveredReply, Delivery, ReplyRoute, TurnOrchestrator, TurnOutcome};
pub use recording::{RecordedAudio, RecordingSession, RecordingState, StopReason};
pub use vad::{VadEvent, VadGate, VadState, VoiceActivityDetector};
