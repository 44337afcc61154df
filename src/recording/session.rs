use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::audio::{assemble_wav, AudioBlob, AudioFrame, MicrophoneSource, MicrophoneStream};
use crate::config::{AudioConfig, RecordingConfig};
use crate::error::{Result, VoiceError};
use crate::timer::Deadline;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingState {
    Idle,
    Capturing,
    /// Audio handed off; waiting for the transcript to be consumed
    Finalizing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Explicit user toggle
    Manual,
    /// VAD hangover expired
    SpeechEnded,
    /// Maximum duration reached
    Timeout,
}

/// A finalized recording
#[derive(Debug, Clone)]
pub struct RecordedAudio {
    pub blob: AudioBlob,
    /// Number of chunks captured before finalizing
    pub chunk_count: usize,
    pub duration: Duration,
    pub started_at: DateTime<Utc>,
    pub reason: StopReason,
}

/// Lifecycle of a single audio capture
///
/// At most one capture exists per session object and `start` refuses to run
/// unless the session is `Idle`, so two device handles are never held at once.
/// Every exit from `Capturing` stops the device tracks.
pub struct RecordingSession {
    config: RecordingConfig,
    sample_rate: u32,
    channels: u16,
    state: RecordingState,
    stream: Option<MicrophoneStream>,
    chunks: Vec<AudioFrame>,
    started_at: Option<Instant>,
    started_wall: DateTime<Utc>,
    max_duration: Deadline,
}

impl RecordingSession {
    pub fn new(config: RecordingConfig, audio: &AudioConfig) -> Self {
        let max_duration = Deadline::new(config.max_duration());
        Self {
            config,
            sample_rate: audio.sample_rate,
            channels: audio.channels,
            state: RecordingState::Idle,
            stream: None,
            chunks: Vec::new(),
            started_at: None,
            started_wall: Utc::now(),
            max_duration,
        }
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    pub fn is_capturing(&self) -> bool {
        self.state == RecordingState::Capturing
    }

    /// Capturing or finalizing
    pub fn is_active(&self) -> bool {
        self.state != RecordingState::Idle
    }

    /// Chunks buffered by the current capture
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Start capturing from a freshly acquired microphone stream
    pub async fn start(&mut self, source: &dyn MicrophoneSource, now: Instant) -> Result<()> {
        if self.state != RecordingState::Idle {
            warn!("Recording start rejected, session is {:?}", self.state);
            return Err(VoiceError::RecordingBusy);
        }

        info!("Starting recording from {}", source.name());

        let mut stream = source.acquire().await.map_err(|e| {
            error!("Failed to acquire microphone: {}", e);
            e
        })?;

        if !stream.has_audio_track() {
            stream.stop_tracks();
            return Err(VoiceError::Device(format!(
                "stream {} has no audio track",
                stream.label()
            )));
        }

        self.chunks.clear();
        self.stream = Some(stream);
        self.started_at = Some(now);
        self.started_wall = Utc::now();
        self.max_duration.start(now);
        self.state = RecordingState::Capturing;

        info!(
            "Recording started (max {}s)",
            self.config.max_duration().as_secs()
        );

        Ok(())
    }

    /// Move delivered frames into the chunk buffer
    pub fn capture_pending(&mut self) -> usize {
        if self.state != RecordingState::Capturing {
            return 0;
        }
        let Some(stream) = self.stream.as_mut() else {
            return 0;
        };

        let frames = stream.drain();
        let count = frames.len();
        self.chunks.extend(frames.into_iter().filter(|f| !f.samples.is_empty()));
        count
    }

    /// Enforce the maximum duration
    ///
    /// Returns the finalize outcome when the cap was hit, `None` otherwise.
    pub fn check_timeout(&mut self, now: Instant) -> Option<Result<RecordedAudio>> {
        if self.state != RecordingState::Capturing {
            return None;
        }
        let event = self.max_duration.check(now)?;
        warn!(
            "Recording reached maximum duration ({}s), stopping",
            event.limit.as_secs()
        );
        self.stop(StopReason::Timeout, now).transpose()
    }

    /// Stop capturing and assemble the recording
    ///
    /// No-op (`Ok(None)`) unless capturing. The device tracks are released
    /// on every path. Recordings below the minimum size fail with
    /// `EmptyRecording` and return the session to `Idle`; otherwise the
    /// session stays `Finalizing` until [`RecordingSession::finish`].
    pub fn stop(&mut self, reason: StopReason, now: Instant) -> Result<Option<RecordedAudio>> {
        if self.state != RecordingState::Capturing {
            debug!("Recording stop ignored, session is {:?}", self.state);
            return Ok(None);
        }

        self.capture_pending();
        self.state = RecordingState::Finalizing;
        self.max_duration.cancel();
        if let Some(mut stream) = self.stream.take() {
            stream.stop_tracks();
        }

        let chunks = std::mem::take(&mut self.chunks);
        let duration = self
            .started_at
            .take()
            .map(|started| now.saturating_duration_since(started))
            .unwrap_or_default();

        info!(
            "Recording stopped ({:?}) after {:.1}s with {} chunks",
            reason,
            duration.as_secs_f64(),
            chunks.len()
        );

        let blob = match assemble_wav(&chunks, self.sample_rate, self.channels) {
            Ok(blob) => blob,
            Err(e) => {
                error!("Failed to assemble recording: {}", e);
                self.state = RecordingState::Idle;
                return Err(e);
            }
        };

        if blob.len() < self.config.min_audio_bytes {
            debug!(
                "Discarding recording of {} bytes (minimum {})",
                blob.len(),
                self.config.min_audio_bytes
            );
            self.state = RecordingState::Idle;
            return Err(VoiceError::EmptyRecording {
                size: blob.len(),
                minimum: self.config.min_audio_bytes,
            });
        }

        Ok(Some(RecordedAudio {
            blob,
            chunk_count: chunks.len(),
            duration,
            started_at: self.started_wall,
            reason,
        }))
    }

    /// The finalized recording has been consumed; back to `Idle`
    pub fn finish(&mut self) {
        if self.state == RecordingState::Finalizing {
            debug!("Recording finalized");
            self.state = RecordingState::Idle;
        }
    }

    /// Drop any capture in progress without producing audio
    pub fn teardown(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop_tracks();
        }
        self.max_duration.cancel();
        self.chunks.clear();
        self.started_at = None;
        self.state = RecordingState::Idle;
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        self.teardown();
    }
}
