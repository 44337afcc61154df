// Cancellable deadlines for the hangover and max-duration timers

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutEvent {
    pub elapsed: Duration,
    pub limit: Duration,
}

/// Deadline that fires once per `start()` call.
///
/// Time is passed in by the caller so state machines driven by a poll timer
/// stay testable without sleeping.
#[derive(Debug)]
pub struct Deadline {
    limit: Duration,
    started_at: Option<Instant>,
    fired: bool,
}

impl Deadline {
    pub fn new(limit: Duration) -> Self {
        Self {
            limit,
            started_at: None,
            fired: false,
        }
    }

    pub fn start(&mut self, now: Instant) {
        self.started_at = Some(now);
        self.fired = false;
    }

    pub fn cancel(&mut self) {
        self.started_at = None;
        self.fired = false;
    }

    pub fn check(&mut self, now: Instant) -> Option<TimeoutEvent> {
        let started_at = self.started_at?;
        if self.fired {
            return None;
        }
        let elapsed = now.saturating_duration_since(started_at);
        if elapsed >= self.limit {
            self.fired = true;
            return Some(TimeoutEvent {
                elapsed,
                limit: self.limit,
            });
        }
        None
    }

    /// Armed and not yet fired
    pub fn is_armed(&self) -> bool {
        self.started_at.is_some() && !self.fired
    }
}
