//! Three-point peak detection window

use crate::protocol::Sample;

/// The two most recent samples of one channel
///
/// A peak is reported when the middle of three consecutive same-channel
/// samples is strictly greater than both of its neighbours.
#[derive(Debug, Clone, Copy, Default)]
pub struct PeakWindow {
    previous: Option<Sample>,
    before_previous: Option<Sample>,
}

impl PeakWindow {
    /// Create an empty window
    pub fn new() -> Self {
        Self::default()
    }

    /// Peak completed by `next`, if any, without advancing the window
    pub fn peak_before(&self, next: &Sample) -> Option<Sample> {
        match (self.before_previous, self.previous) {
            (Some(pp), Some(p)) if p.raw_code > pp.raw_code && p.raw_code > next.raw_code => {
                Some(p)
            }
            _ => None,
        }
    }

    /// Feed the next sample; returns the peak it completes, if any
    pub fn advance(&mut self, next: Sample) -> Option<Sample> {
        let peak = self.peak_before(&next);
        self.before_previous = self.previous;
        self.previous = Some(next);
        peak
    }

    /// Number of samples currently held (0..=2)
    pub fn len(&self) -> usize {
        self.previous.is_some() as usize + self.before_previous.is_some() as usize
    }

    /// Check if the window holds no samples yet
    pub fn is_empty(&self) -> bool {
        self.previous.is_none()
    }
}
