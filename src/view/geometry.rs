//! Window geometry rate limiting and width locking.
//!
//! Resize requests are dropped when they arrive inside the minimum
//! spacing window of the previous applied update, or when the size delta
//! is below the jitter threshold. While the view is away from idle the
//! width is locked, so content-height changes never widen the window.

use std::time::Duration;

use tokio::time::Instant;

pub const MIN_RESIZE_SPACING: Duration = Duration::from_millis(100);
pub const DELTA_THRESHOLD_PX: f64 = 4.0;

#[derive(Debug)]
pub struct GeometryLimiter {
    min_spacing: Duration,
    delta_threshold: f64,
    last_applied: Option<(f64, f64)>,
    last_applied_at: Option<Instant>,
    locked_width: Option<f64>,
    /// Width was locked before any resize happened; adopt the next
    /// requested width as the locked one.
    adopt_next_width: bool,
}

impl Default for GeometryLimiter {
    fn default() -> Self {
        Self {
            min_spacing: MIN_RESIZE_SPACING,
            delta_threshold: DELTA_THRESHOLD_PX,
            last_applied: None,
            last_applied_at: None,
            locked_width: None,
            adopt_next_width: false,
        }
    }
}

impl GeometryLimiter {
    /// Pin the current width. Called once when the view leaves idle.
    pub fn lock_width(&mut self) {
        match self.last_applied {
            Some((w, _)) => self.locked_width = Some(w),
            None => self.adopt_next_width = true,
        }
    }

    /// Release the width lock. Called when the view returns to idle.
    pub fn unlock_width(&mut self) {
        self.locked_width = None;
        self.adopt_next_width = false;
    }

    pub fn locked_width(&self) -> Option<f64> {
        self.locked_width
    }

    /// Decide whether a resize request should be applied, returning the
    /// (possibly width-locked) dimensions to use.
    pub fn decide(&mut self, width: f64, height: f64, now: Instant) -> Option<(f64, f64)> {
        if self.adopt_next_width {
            self.locked_width = Some(width);
            self.adopt_next_width = false;
        }
        let width = self.locked_width.unwrap_or(width);

        if let Some(at) = self.last_applied_at {
            if now.duration_since(at) < self.min_spacing {
                return None;
            }
        }
        if let Some((last_w, last_h)) = self.last_applied {
            if (width - last_w).abs() < self.delta_threshold
                && (height - last_h).abs() < self.delta_threshold
            {
                return None;
            }
        }

        self.last_applied = Some((width, height));
        self.last_applied_at = Some(now);
        Some((width, height))
    }
}
