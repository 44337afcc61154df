use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::error::Result;

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since the stream started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    /// Size of the PCM payload in bytes
    pub fn byte_len(&self) -> usize {
        self.samples.len() * std::mem::size_of::<i16>()
    }

    pub fn duration_ms(&self) -> u64 {
        let per_second = self.sample_rate as u64 * self.channels.max(1) as u64;
        if per_second == 0 {
            return 0;
        }
        self.samples.len() as u64 * 1000 / per_second
    }

    /// Mono samples normalized to [-1.0, 1.0], averaging interleaved channels
    pub fn mono_f32(&self) -> Vec<f32> {
        let channels = self.channels.max(1) as usize;
        self.samples
            .chunks(channels)
            .map(|frame| {
                let sum: f32 = frame.iter().map(|&s| s as f32 / i16::MAX as f32).sum();
                sum / frame.len() as f32
            })
            .collect()
    }
}

/// A live microphone stream
///
/// The stream owns its frame receiver and the stop signal for the device
/// tracks behind it. Tracks are stopped exactly once, either explicitly via
/// [`MicrophoneStream::stop_tracks`] or when the stream is dropped.
pub struct MicrophoneStream {
    label: String,
    frames: mpsc::Receiver<AudioFrame>,
    audio_tracks: usize,
    stop_tx: Option<oneshot::Sender<()>>,
}

impl MicrophoneStream {
    pub fn new(
        label: impl Into<String>,
        frames: mpsc::Receiver<AudioFrame>,
        audio_tracks: usize,
        stop_tx: oneshot::Sender<()>,
    ) -> Self {
        Self {
            label: label.into(),
            frames,
            audio_tracks,
            stop_tx: Some(stop_tx),
        }
    }

    /// Create a stream together with the producer half that feeds it
    pub fn channel(label: impl Into<String>, capacity: usize) -> (Self, MicrophoneFeed) {
        Self::channel_with_tracks(label, capacity, 1)
    }

    pub fn channel_with_tracks(
        label: impl Into<String>,
        capacity: usize,
        audio_tracks: usize,
    ) -> (Self, MicrophoneFeed) {
        let (tx, rx) = mpsc::channel(capacity);
        let (stop_tx, stop_rx) = oneshot::channel();
        let stream = Self::new(label, rx, audio_tracks, stop_tx);
        let feed = MicrophoneFeed {
            tx,
            stop_rx,
            stopped: false,
        };
        (stream, feed)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn has_audio_track(&self) -> bool {
        self.audio_tracks > 0
    }

    /// Whether the device tracks are still running
    pub fn is_live(&self) -> bool {
        self.stop_tx.is_some()
    }

    /// Take all frames delivered since the last call, in arrival order
    pub fn drain(&mut self) -> Vec<AudioFrame> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.frames.try_recv() {
            frames.push(frame);
        }
        frames
    }

    /// Stop the device tracks. Idempotent.
    pub fn stop_tracks(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            // Producer may already be gone
            let _ = stop_tx.send(());
            self.frames.close();
            debug!("Stopped tracks for microphone stream {}", self.label);
        }
    }
}

impl Drop for MicrophoneStream {
    fn drop(&mut self) {
        self.stop_tracks();
    }
}

impl std::fmt::Debug for MicrophoneStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MicrophoneStream")
            .field("label", &self.label)
            .field("audio_tracks", &self.audio_tracks)
            .field("live", &self.is_live())
            .finish()
    }
}

/// Producer half of a [`MicrophoneStream`]
pub struct MicrophoneFeed {
    tx: mpsc::Sender<AudioFrame>,
    stop_rx: oneshot::Receiver<()>,
    stopped: bool,
}

impl MicrophoneFeed {
    /// Deliver a frame. Returns false once the consumer is gone.
    pub async fn send(&self, frame: AudioFrame) -> bool {
        self.tx.send(frame).await.is_ok()
    }

    pub fn try_send(&self, frame: AudioFrame) -> bool {
        self.tx.try_send(frame).is_ok()
    }

    /// Whether the consumer stopped the tracks or dropped the stream
    pub fn is_stopped(&mut self) -> bool {
        if !self.stopped {
            match self.stop_rx.try_recv() {
                Err(oneshot::error::TryRecvError::Empty) => {}
                _ => self.stopped = true,
            }
        }
        self.stopped
    }

    /// Resolves once the tracks are stopped
    pub async fn stopped(&mut self) {
        if self.stopped {
            return;
        }
        let _ = (&mut self.stop_rx).await;
        self.stopped = true;
    }
}

/// Source of microphone streams
///
/// Every call to `acquire` must hand out a fresh stream with its own device
/// handle. Implementations:
/// - File: plays a WAV file as a live microphone (testing/batch runs)
/// - Host-provided sources (browser bridge, native capture)
#[async_trait::async_trait]
pub trait MicrophoneSource: Send + Sync {
    /// Acquire a new stream
    ///
    /// Fails with `VoiceError::Device` when no microphone is available and
    /// `VoiceError::Permission` when access is refused.
    async fn acquire(&self) -> Result<MicrophoneStream>;

    /// Get source name for logging
    fn name(&self) -> &str;
}
