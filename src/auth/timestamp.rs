//! Replay-window timestamp validation.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Default acceptance window in seconds (5 minutes).
pub const DEFAULT_TIMESTAMP_WINDOW_SECS: u64 = 300;

/// Source of the current Unix time in seconds.
pub trait Clock: Send + Sync {
    fn now_secs(&self) -> i64;
}

/// Wall clock backed by [`SystemTime`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> i64 {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_secs() as i64,
            // Clock set before 1970
            Err(e) => -(e.duration().as_secs() as i64),
        }
    }
}

/// Clock pinned to a single instant, for tests and offline tooling.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now_secs(&self) -> i64 {
        self.0
    }
}

/// Checks that a request timestamp falls within `window` seconds of now.
#[derive(Clone)]
pub struct TimestampValidator {
    window_secs: u64,
    clock: Arc<dyn Clock>,
}

impl TimestampValidator {
    /// Create a validator using the system clock.
    pub fn new(window_secs: u64) -> Self {
        Self::with_clock(window_secs, Arc::new(SystemClock))
    }

    pub fn with_clock(window_secs: u64, clock: Arc<dyn Clock>) -> Self {
        Self { window_secs, clock }
    }

    pub fn window_secs(&self) -> u64 {
        self.window_secs
    }

    /// Validate a raw timestamp header value.
    ///
    /// Returns `false` if the value is not a decimal integer. Otherwise
    /// returns whether `|now - timestamp| <= window`.
    pub fn validate(&self, timestamp: &str) -> bool {
        let Ok(ts) = timestamp.parse::<i64>() else {
            return false;
        };
        self.clock.now_secs().abs_diff(ts) <= self.window_secs
    }
}

impl Default for TimestampValidator {
    fn default() -> Self {
        Self::new(DEFAULT_TIMESTAMP_WINDOW_SECS)
    }
}

impl std::fmt::Debug for TimestampValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimestampValidator")
            .field("window_secs", &self.window_secs)
            .finish_non_exhaustive()
    }
}
