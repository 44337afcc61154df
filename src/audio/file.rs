use anyhow::{Context, Result};
use hound::WavReader;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use super::backend::{AudioFrame, MicrophoneSource, MicrophoneStream};
use crate::error::VoiceError;

pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path).context("Failed to open WAV file")?;

        let spec = reader.spec();
        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?;

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    /// Split the file into consecutive frames of `frame_ms` milliseconds
    pub fn frames(&self, frame_ms: u64) -> Vec<AudioFrame> {
        let per_frame = (self.sample_rate as u64 * frame_ms / 1000) as usize
            * self.channels.max(1) as usize;
        if per_frame == 0 {
            return Vec::new();
        }

        self.samples
            .chunks(per_frame)
            .enumerate()
            .map(|(i, chunk)| AudioFrame {
                samples: chunk.to_vec(),
                sample_rate: self.sample_rate,
                channels: self.channels,
                timestamp_ms: i as u64 * frame_ms,
            })
            .collect()
    }
}

/// Plays a WAV file as if it were a live microphone
///
/// Playback starts on the first `acquire` and runs in real time. Every
/// acquired stream receives the frames played from that moment on, the way
/// two captures of the same physical microphone would.
pub struct FileMicrophone {
    path: String,
    frame_ms: u64,
    frames_tx: broadcast::Sender<AudioFrame>,
    player: Mutex<Option<tokio::task::JoinHandle<()>>>,
    finished_tx: Arc<watch::Sender<bool>>,
}

impl FileMicrophone {
    pub fn new(path: impl Into<String>, frame_ms: u64) -> Self {
        let (frames_tx, _) = broadcast::channel(256);
        let (finished_tx, _) = watch::channel(false);
        Self {
            path: path.into(),
            frame_ms: frame_ms.max(1),
            frames_tx,
            player: Mutex::new(None),
            finished_tx: Arc::new(finished_tx),
        }
    }

    /// Resolves once the whole file has been played
    pub async fn wait_until_finished(&self) {
        let mut finished = self.finished_tx.subscribe();
        // Sender lives as long as self
        let _ = finished.wait_for(|done| *done).await;
    }

    fn ensure_playing(&self) -> crate::error::Result<()> {
        let mut player = self
            .player
            .lock()
            .map_err(|_| VoiceError::Device("file microphone lock poisoned".to_string()))?;
        if player.is_some() {
            return Ok(());
        }

        let audio = AudioFile::open(&self.path)
            .map_err(|e| VoiceError::Device(format!("{:#}", e)))?;
        let frames = audio.frames(self.frame_ms);
        let frames_tx = self.frames_tx.clone();
        let finished_tx = Arc::clone(&self.finished_tx);
        let frame_ms = self.frame_ms;

        *player = Some(tokio::spawn(async move {
            info!("File microphone playback started ({} frames)", frames.len());
            let mut ticker = tokio::time::interval(Duration::from_millis(frame_ms));
            for frame in frames {
                ticker.tick().await;
                // No subscribers just means nobody is listening right now
                let _ = frames_tx.send(frame);
            }
            finished_tx.send_replace(true);
            info!("File microphone playback finished");
        }));

        Ok(())
    }
}

#[async_trait::async_trait]
impl MicrophoneSource for FileMicrophone {
    async fn acquire(&self) -> crate::error::Result<MicrophoneStream> {
        let mut frames_rx = self.frames_tx.subscribe();
        self.ensure_playing()?;

        let (stream, mut feed) = MicrophoneStream::channel(format!("file:{}", self.path), 256);

        tokio::spawn(async move {
            loop {
                let received = tokio::select! {
                    _ = feed.stopped() => break,
                    frame = frames_rx.recv() => frame,
                };
                match received {
                    Ok(frame) => {
                        if !feed.send(frame).await {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("File microphone consumer lagged, skipped {} frames", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("File microphone stream closed");
        });

        Ok(stream)
    }

    fn name(&self) -> &str {
        "WAV file"
    }
}
