//! Wall-clock latency measurement on the monotonic clock

use std::time::{Duration, Instant};

/// Decimal places latency is reported with
pub const LATENCY_DECIMALS: i32 = 5;

/// Round to a fixed number of decimal places
pub fn round_to_decimals(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Measures one interval from construction
#[derive(Debug, Clone, Copy)]
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start timing now
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Elapsed seconds, rounded to [`LATENCY_DECIMALS`] places
    pub fn elapsed_secs_rounded(&self) -> f64 {
        round_to_decimals(self.elapsed().as_secs_f64(), LATENCY_DECIMALS)
    }
}

/// Run `f` and return its output with the rounded latency in seconds
pub fn timed<T>(f: impl FnOnce() -> T) -> (T, f64) {
    let timer = Timer::start();
    let output = f();
    (output, timer.elapsed_secs_rounded())
}
