//! Capture timestamps

use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Epoch-scaled clock that never goes backwards
///
/// The wall clock is read once at construction; later readings add the
/// monotonic time elapsed since then. Copies share the same anchor, so both
/// producers stamp samples on one timeline.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    anchor: Instant,
    anchor_epoch_nanos: i64,
}

impl MonotonicClock {
    /// Anchor a clock at the current wall-clock time
    pub fn new() -> Self {
        let epoch_nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
            .unwrap_or(0);
        Self::anchored_at(epoch_nanos)
    }

    /// Anchor a clock at a fixed epoch timestamp
    pub fn anchored_at(anchor_epoch_nanos: i64) -> Self {
        Self {
            anchor: Instant::now(),
            anchor_epoch_nanos,
        }
    }

    /// Current time in epoch nanoseconds
    pub fn now_nanos(&self) -> i64 {
        let elapsed = i64::try_from(self.anchor.elapsed().as_nanos()).unwrap_or(i64::MAX);
        self.anchor_epoch_nanos.saturating_add(elapsed)
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}
