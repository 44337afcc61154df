use serde::Serialize;
use std::fmt;

/// Transient user-facing notices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Notice {
    ListeningStarted,
    ListeningStopped,
    /// Recording hit the maximum duration and was stopped automatically
    RecordingTimedOut,
    /// Transcription came back empty
    NothingHeard,
    TranscriptionFailed,
    RecordingFailed,
    MicrophoneUnavailable,
    /// Replies are shown as text only
    TextOnly,
    Reconnecting,
    AutoDetectEnabled,
    AutoDetectDisabled,
}

impl Notice {
    pub fn message(&self) -> &'static str {
        match self {
            Notice::ListeningStarted => "Ég er að hlusta...",
            Notice::ListeningStopped => "Hætt að hlusta",
            Notice::RecordingTimedOut => "Hámarkslengd upptöku náð. Hætt að hlusta.",
            Notice::NothingHeard => "Ekkert tal greindist. Reyndu aftur.",
            Notice::TranscriptionFailed => "Villa við vinnslu hljóðupptöku. Reyndu aftur.",
            Notice::RecordingFailed => {
                "Ekki tókst að hefja upptöku. Athugaðu að vefurinn hafi aðgang að hljóðnema."
            }
            Notice::MicrophoneUnavailable => {
                "Ekki tókst að fá aðgang að hljóðnema. Virkjaðu hljóðnemann í stillingum vafrans."
            }
            Notice::TextOnly => "Raddsvörun ekki í boði. Svör sýnd sem texti.",
            Notice::Reconnecting => "Reyni að tengjast aftur...",
            Notice::AutoDetectEnabled => "Sjálfvirk raddgreining virkjuð.",
            Notice::AutoDetectDisabled => "Sjálfvirk raddgreining óvirk.",
        }
    }

    /// Error notices are shown more prominently than informational ones
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Notice::TranscriptionFailed
                | Notice::RecordingFailed
                | Notice::MicrophoneUnavailable
        )
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}
