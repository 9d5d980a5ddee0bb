//! Client-side clock tamper detection.
//!
//! Between two exchanges the wall clock and the monotonic clock should
//! advance by about the same amount. If the wall clock falls behind the
//! monotonic clock by more than the tolerance, someone wound the system
//! time back.

use floatlease_types::{ClockSide, LeaseError, LeaseResult};
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime};
use tracing::warn;

/// Default allowed drift between wall-clock and monotonic elapsed time.
pub const DEFAULT_CLOCK_TOLERANCE: Duration = Duration::from_secs(5 * 60);

/// Tracks wall-clock against monotonic time across exchanges.
#[derive(Debug)]
pub struct ClockWatch {
    tolerance: Duration,
    last: Mutex<Option<(SystemTime, Instant)>>,
}

impl ClockWatch {
    /// Creates a watch with the given tolerance.
    pub fn new(tolerance: Duration) -> Self {
        Self {
            tolerance,
            last: Mutex::new(None),
        }
    }

    /// Checks the current system clocks.
    ///
    /// # Errors
    ///
    /// Returns [`LeaseError::ClockTampered`] if the wall clock was moved back.
    pub fn check(&self) -> LeaseResult<()> {
        self.observe(SystemTime::now(), Instant::now())
    }

    /// Records one observation of both clocks and compares it with the
    /// previous one. The new observation becomes the baseline either way.
    ///
    /// # Errors
    ///
    /// Returns [`LeaseError::ClockTampered`] if the wall clock fell behind
    /// the monotonic clock by more than the tolerance.
    pub fn observe(&self, wall: SystemTime, mono: Instant) -> LeaseResult<()> {
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        let previous = last.replace((wall, mono));

        let Some((prev_wall, prev_mono)) = previous else {
            return Ok(());
        };

        let mono_elapsed = mono.saturating_duration_since(prev_mono);
        let lag = match wall.duration_since(prev_wall) {
            Ok(wall_elapsed) => mono_elapsed.saturating_sub(wall_elapsed),
            Err(backwards) => mono_elapsed + backwards.duration(),
        };

        if lag > self.tolerance {
            warn!(
                "System clock moved back by {:?} (tolerance {:?})",
                lag, self.tolerance
            );
            return Err(LeaseError::ClockTampered(ClockSide::Client));
        }
        Ok(())
    }
}

impl Default for ClockWatch {
    fn default() -> Self {
        Self::new(DEFAULT_CLOCK_TOLERANCE)
    }
}
