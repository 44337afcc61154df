use chrono::Utc;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::{FailureSource, VoiceError};
use crate::gateway::{DiagnosticEvent, DiagnosticSink};

/// Snapshot of the failure counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailureState {
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub fallback_mode: bool,
}

/// Counts failures across subsystems and decides when to fall back
///
/// Fallback is entered once `retry_count` exceeds the threshold or a hard
/// error is signalled. It stays latched until [`FailureTracker::reset`].
/// Mode changes are pushed to subscribers as they happen.
pub struct FailureTracker {
    threshold: u32,
    state: FailureState,
    hard_error: bool,
    sink: Arc<dyn DiagnosticSink>,
    mode_tx: watch::Sender<bool>,
}

impl FailureTracker {
    pub fn new(threshold: u32, sink: Arc<dyn DiagnosticSink>) -> Self {
        let (mode_tx, _) = watch::channel(false);
        Self {
            threshold,
            state: FailureState::default(),
            hard_error: false,
            sink,
            mode_tx,
        }
    }

    /// Count a failure and report it to the diagnostic sink
    ///
    /// Returns whether fallback mode is active afterwards.
    pub fn record_failure(&mut self, source: FailureSource, error: &VoiceError) -> bool {
        self.state.retry_count = self.state.retry_count.saturating_add(1);
        self.state.last_error = Some(error.to_string());
        if error.is_hard() {
            self.hard_error = true;
        }

        warn!(
            "Failure #{} from {}: {}",
            self.state.retry_count, source, error
        );
        self.reevaluate();

        self.sink.log(DiagnosticEvent {
            source,
            message: error.to_string(),
            retry_count: self.state.retry_count,
            fallback_mode: self.state.fallback_mode,
            timestamp: Utc::now(),
        });

        self.state.fallback_mode
    }

    /// Force fallback, e.g. after a persistent initialization failure
    pub fn signal_hard_error(&mut self, reason: &str) {
        warn!("Hard error signalled: {}", reason);
        self.hard_error = true;
        self.state.last_error = Some(reason.to_string());
        self.reevaluate();
    }

    pub fn should_enter_fallback(&self) -> bool {
        self.state.fallback_mode
    }

    pub fn state(&self) -> FailureState {
        self.state.clone()
    }

    pub fn retry_count(&self) -> u32 {
        self.state.retry_count
    }

    /// Receive fallback mode changes
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.mode_tx.subscribe()
    }

    /// Clear everything; only for an explicit user reconnect
    pub fn reset(&mut self) {
        info!(
            "Resetting failure tracker (retry_count={}, fallback={})",
            self.state.retry_count, self.state.fallback_mode
        );
        self.state = FailureState::default();
        self.hard_error = false;
        self.publish();
    }

    fn reevaluate(&mut self) {
        if self.state.fallback_mode {
            return;
        }
        if self.hard_error || self.state.retry_count > self.threshold {
            warn!(
                "Entering fallback mode (retry_count={}, hard_error={})",
                self.state.retry_count, self.hard_error
            );
            self.state.fallback_mode = true;
            self.publish();
        }
    }

    fn publish(&self) {
        let mode = self.state.fallback_mode;
        self.mode_tx.send_if_modified(|current| {
            if *current == mode {
                return false;
            }
            *current = mode;
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CollectingSink {
        events: Mutex<Vec<DiagnosticEvent>>,
    }

    impl DiagnosticSink for CollectingSink {
        fn log(&self, event: DiagnosticEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    fn transcription_error() -> VoiceError {
        VoiceError::Transcription("502 Bad Gateway".to_string())
    }

    #[test]
    fn test_fallback_after_threshold_exceeded() {
        let sink = Arc::new(CollectingSink::default());
        let mut tracker = FailureTracker::new(3, sink.clone());

        for _ in 0..3 {
            assert!(!tracker.record_failure(FailureSource::Transcription, &transcription_error()));
        }
        assert!(!tracker.should_enter_fallback());

        assert!(tracker.record_failure(FailureSource::Transcription, &transcription_error()));
        assert!(tracker.should_enter_fallback());

        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 4);
        assert_eq!(events[3].retry_count, 4);
        assert!(events[3].fallback_mode);
    }

    #[test]
    fn test_hard_error_enters_fallback_immediately() {
        let mut tracker = FailureTracker::new(3, Arc::new(CollectingSink::default()));
        tracker.record_failure(
            FailureSource::Response,
            &VoiceError::response_init("assistant missing"),
        );
        assert!(tracker.should_enter_fallback());
        assert_eq!(tracker.retry_count(), 1);
    }

    #[test]
    fn test_signal_hard_error() {
        let mut tracker = FailureTracker::new(3, Arc::new(CollectingSink::default()));
        tracker.signal_hard_error("initialization failed");
        assert!(tracker.should_enter_fallback());
        assert_eq!(
            tracker.state().last_error.as_deref(),
            Some("initialization failed")
        );
    }

    #[test]
    fn test_reset_clears_state() {
        let mut tracker = FailureTracker::new(0, Arc::new(CollectingSink::default()));
        tracker.record_failure(FailureSource::Render, &VoiceError::Render("tts".into()));
        assert!(tracker.should_enter_fallback());

        tracker.reset();
        assert_eq!(tracker.state(), FailureState::default());
        assert!(!tracker.should_enter_fallback());
    }

    #[tokio::test]
    async fn test_mode_changes_are_pushed() {
        let mut tracker = FailureTracker::new(1, Arc::new(CollectingSink::default()));
        let mut rx = tracker.subscribe();
        assert!(!*rx.borrow());

        tracker.record_failure(FailureSource::Transcription, &transcription_error());
        assert!(!rx.has_changed().unwrap());

        tracker.record_failure(FailureSource::Transcription, &transcription_error());
        rx.changed().await.unwrap();
        assert!(*rx.borrow_and_update());

        tracker.reset();
        rx.changed().await.unwrap();
        assert!(!*rx.borrow_and_update());
    }
}
