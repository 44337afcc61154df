use serde::Serialize;
use std::fmt;

/// Subsystem that reported a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureSource {
    Microphone,
    Recording,
    Transcription,
    Response,
    Render,
}

impl fmt::Display for FailureSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureSource::Microphone => "microphone",
            FailureSource::Recording => "recording",
            FailureSource::Transcription => "transcription",
            FailureSource::Response => "response",
            FailureSource::Render => "render",
        };
        f.write_str(name)
    }
}

/// Errors produced by the voice interaction core and its boundary calls
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VoiceError {
    /// Microphone unavailable, stream without an audio track, or device failure
    #[error("microphone unavailable: {0}")]
    Device(String),

    /// Microphone permission denied by the host
    #[error("microphone permission denied: {0}")]
    Permission(String),

    /// Finished recording too small to be worth transcribing
    #[error("recording too short ({size} bytes, minimum {minimum})")]
    EmptyRecording { size: usize, minimum: usize },

    /// A recording is already capturing or finalizing
    #[error("a recording is already in progress")]
    RecordingBusy,

    /// Captured chunks could not be assembled into a WAV blob
    #[error("failed to encode recording: {0}")]
    Encoding(String),

    #[error("transcription failed: {0}")]
    Transcription(String),

    /// Primary response backend failed. `initialization` marks failures of
    /// the startup/reconnect handshake rather than of a single turn.
    #[error("response service failed: {message}")]
    ResponsePath { message: String, initialization: bool },

    #[error("voice rendering failed: {0}")]
    Render(String),
}

impl VoiceError {
    pub fn response(message: impl Into<String>) -> Self {
        VoiceError::ResponsePath {
            message: message.into(),
            initialization: false,
        }
    }

    pub fn response_init(message: impl Into<String>) -> Self {
        VoiceError::ResponsePath {
            message: message.into(),
            initialization: true,
        }
    }

    /// Subsystem this error belongs to
    pub fn kind(&self) -> FailureSource {
        match self {
            VoiceError::Device(_) | VoiceError::Permission(_) => FailureSource::Microphone,
            VoiceError::EmptyRecording { .. }
            | VoiceError::RecordingBusy
            | VoiceError::Encoding(_) => FailureSource::Recording,
            VoiceError::Transcription(_) => FailureSource::Transcription,
            VoiceError::ResponsePath { .. } => FailureSource::Response,
            VoiceError::Render(_) => FailureSource::Render,
        }
    }

    /// Hard errors switch the assistant into fallback mode immediately
    pub fn is_hard(&self) -> bool {
        matches!(
            self,
            VoiceError::ResponsePath {
                initialization: true,
                ..
            }
        )
    }
}

pub type Result<T> = std::result::Result<T, VoiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            VoiceError::Device("gone".into()).kind(),
            FailureSource::Microphone
        );
        assert_eq!(
            VoiceError::EmptyRecording { size: 12, minimum: 100 }.kind(),
            FailureSource::Recording
        );
        assert_eq!(VoiceError::response("500").kind(), FailureSource::Response);
        assert_eq!(VoiceError::Render("tts".into()).kind(), FailureSource::Render);
    }

    #[test]
    fn test_only_init_failures_are_hard() {
        assert!(VoiceError::response_init("no assistant").is_hard());
        assert!(!VoiceError::Permission("denied".into()).is_hard());
        assert!(!VoiceError::response("timeout").is_hard());
        assert!(!VoiceError::Transcription("502".into()).is_hard());
        assert!(!VoiceError::Device("unplugged".into()).is_hard());
    }
}
