use std::time::Duration;
use tokio::time::Instant;
use crate::models::position::PositionFix;
use crate::models::view::CameraMove;

/// At-most-once-per-interval gate between raw fixes and the check-in state.
/// Fixes arriving inside the window are dropped, not queued.
pub struct UpdateThrottle {
    min_interval: Duration,
    last_applied: Option<Instant>,
    applied: u64,
}

impl UpdateThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self { min_interval, last_applied: None, applied: 0 }
    }

    /// Returns the camera move to perform if the fix is applied, `None` if dropped.
    pub fn offer(&mut self, fix: &PositionFix, now: Instant) -> Option<CameraMove> {
        if let Some(last) = self.last_applied {
            if now.saturating_duration_since(last) < self.min_interval {
                return None;
            }
        }

        self.last_applied = Some(now);
        self.applied += 1;
        Some(CameraMove {
            center: fix.coordinate,
            animate: self.applied == 1,
            seq: self.applied,
        })
    }

    /// Forget history so the next fix applies immediately and flies again.
    pub fn reset(&mut self) {
        self.last_applied = None;
        self.applied = 0;
    }
}
