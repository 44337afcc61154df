// Voice activity detection on the polled microphone level
//
// Speech START is a single sample above the threshold. Speech END needs the
// level to stay at or below the threshold for the whole hangover window, so
// natural pauses inside a sentence do not cut the recording short.

use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::VadConfig;
use crate::error::{Result, VoiceError};
use crate::timer::Deadline;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadState {
    Silent,
    Speaking,
    /// Level dropped while speaking; hangover timer running
    PendingSilence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadEvent {
    /// Start a recording
    SpeechStarted,
    /// Stop and finalize the recording
    SpeechEnded,
}

/// What the rest of the assistant is doing right now
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VadGate {
    /// A recording is capturing or finalizing
    pub recording_active: bool,
    /// A previous turn is still being processed
    pub processing: bool,
}

impl VadGate {
    fn is_open(&self) -> bool {
        !self.recording_active && !self.processing
    }
}

pub struct VoiceActivityDetector {
    threshold: f32,
    state: VadState,
    hangover: Deadline,
    auto_detect: bool,
    permission_denied: bool,
}

impl VoiceActivityDetector {
    pub fn new(config: &VadConfig) -> Self {
        info!(
            "VAD config: threshold={:.4}, hangover={}ms",
            config.threshold, config.hangover_ms
        );

        Self {
            threshold: config.threshold,
            state: VadState::Silent,
            hangover: Deadline::new(Duration::from_millis(config.hangover_ms)),
            auto_detect: false,
            permission_denied: false,
        }
    }

    pub fn state(&self) -> VadState {
        self.state
    }

    pub fn is_auto_detect(&self) -> bool {
        self.auto_detect
    }

    pub fn is_permission_denied(&self) -> bool {
        self.permission_denied
    }

    /// Turn automatic detection on or off
    ///
    /// Enabling fails with `VoiceError::Permission` while a permission denial
    /// is on record. Disabling always succeeds and returns to `Silent`.
    pub fn set_auto_detect(&mut self, enabled: bool) -> Result<()> {
        if enabled && self.permission_denied {
            return Err(VoiceError::Permission(
                "microphone access was denied".to_string(),
            ));
        }
        if enabled {
            self.auto_detect = true;
        } else {
            self.disable();
        }
        Ok(())
    }

    /// Turn detection off and return to `Silent`
    pub fn disable(&mut self) {
        self.auto_detect = false;
        self.reset();
    }

    /// Record a permission denial: detection is disabled and stays `Silent`
    pub fn report_permission_denied(&mut self, reason: &str) -> VoiceError {
        warn!("VAD disabled, microphone permission denied: {}", reason);
        self.permission_denied = true;
        self.disable();
        VoiceError::Permission(reason.to_string())
    }

    /// Permission was granted again by an explicit user action
    pub fn clear_permission_denied(&mut self) {
        self.permission_denied = false;
    }

    /// Feed one level sample, in arrival order
    pub fn process(&mut self, level: f32, now: Instant, gate: VadGate) -> Option<VadEvent> {
        if !self.auto_detect || self.permission_denied {
            return None;
        }

        if let Some(event) = self.poll_hangover(now) {
            return Some(event);
        }

        let loud = level > self.threshold;
        match self.state {
            VadState::Silent => {
                if loud && gate.is_open() {
                    debug!("VAD: speech started (level={:.3})", level);
                    self.state = VadState::Speaking;
                    return Some(VadEvent::SpeechStarted);
                }
            }
            VadState::Speaking => {
                if !loud {
                    debug!("VAD: level dropped, hangover started");
                    self.state = VadState::PendingSilence;
                    self.hangover.start(now);
                }
            }
            VadState::PendingSilence => {
                if loud {
                    debug!("VAD: speech resumed within hangover");
                    self.state = VadState::Speaking;
                    self.hangover.cancel();
                }
            }
        }

        None
    }

    /// Fire the hangover timer if it has run out
    pub fn poll_hangover(&mut self, now: Instant) -> Option<VadEvent> {
        if self.state != VadState::PendingSilence {
            return None;
        }
        let event = self.hangover.check(now)?;
        debug!(
            "VAD: silence for {}ms, speech ended",
            event.elapsed.as_millis()
        );
        self.state = VadState::Silent;
        self.hangover.cancel();
        Some(VadEvent::SpeechEnded)
    }

    /// Back to `Silent` with the hangover timer cleared
    pub fn reset(&mut self) {
        self.state = VadState::Silent;
        self.hangover.cancel();
    }
}
