use std::time::{Duration, Instant};

pub const DEFAULT_STABILITY: Duration = Duration::from_millis(500);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WatchTiming {
    /// Silence required after the last event before a rescan fires.
    pub stability: Duration,
    /// How often a pending gate is checked.
    pub poll_interval: Duration,
}

impl Default for WatchTiming {
    fn default() -> Self {
        Self {
            stability: DEFAULT_STABILITY,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Coalesces a burst of change events into a single trigger.
///
/// Every `record` pushes the deadline out; `poll` fires once the deadline
/// passes with no newer event, then disarms. Instants are passed in so the
/// gate never reads a clock itself.
#[derive(Clone, Debug)]
pub struct QuiescenceGate {
    stability: Duration,
    last_event_at: Option<Instant>,
}

impl QuiescenceGate {
    pub fn new(stability: Duration) -> Self {
        Self {
            stability,
            last_event_at: None,
        }
    }

    pub fn record(&mut self, now: Instant) {
        self.last_event_at = Some(now);
    }

    pub fn is_armed(&self) -> bool {
        self.last_event_at.is_some()
    }

    pub fn poll(&mut self, now: Instant) -> bool {
        let due = self
            .last_event_at
            .is_some_and(|last| now.saturating_duration_since(last) >= self.stability);
        if due {
            self.last_event_at = None;
        }
        due
    }
}
