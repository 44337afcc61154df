//! Recording lifecycle
//!
//! `RecordingSession` owns the microphone handle for one capture at a time:
//! - acquires a fresh stream on start (never the VAD monitor's)
//! - buffers chunks while capturing
//! - enforces the maximum duration
//! - assembles the chunks into a WAV blob and guards against empty recordings

mod session;

pub use session::{RecordedAudio, RecordingSession, RecordingState, StopReason};
