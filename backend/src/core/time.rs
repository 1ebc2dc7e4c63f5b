//! Time management for the pool
//!
//! Every operation runs against an explicit timestamp (unix seconds). The
//! pool never reads a wall clock: callers advance the [`Clock`] themselves,
//! which keeps replay and tests deterministic.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Seconds in one accrual day
pub const SECONDS_PER_DAY: u64 = 86_400;

/// Seconds in one accrual year (365 days, no leap handling)
pub const SECONDS_PER_YEAR: u64 = 365 * SECONDS_PER_DAY;

/// Number of whole days between two timestamps (0 if `to` precedes `from`)
///
/// # Example
/// ```
/// use factoring_pool_core_rs::core::time::{whole_days_between, SECONDS_PER_DAY};
///
/// assert_eq!(whole_days_between(0, SECONDS_PER_DAY - 1), 0);
/// assert_eq!(whole_days_between(0, 3 * SECONDS_PER_DAY + 5), 3);
/// assert_eq!(whole_days_between(10, 5), 0);
/// ```
pub fn whole_days_between(from: u64, to: u64) -> u64 {
    to.saturating_sub(from) / SECONDS_PER_DAY
}

/// Errors raised when moving the clock
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClockError {
    #[error("Clock cannot move backwards ({requested} < {now})")]
    Backwards { now: u64, requested: u64 },
}

/// Manages pool time as a unix-seconds timestamp
///
/// # Example
/// ```
/// use factoring_pool_core_rs::Clock;
///
/// let mut clock = Clock::new(1_700_000_000);
/// clock.advance_days(2);
/// assert_eq!(clock.now(), 1_700_000_000 + 2 * 86_400);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clock {
    /// Current timestamp (unix seconds)
    now: u64,
}

impl Clock {
    /// Create a clock starting at `start` (unix seconds)
    pub fn new(start: u64) -> Self {
        Self { now: start }
    }

    /// Current timestamp
    pub fn now(&self) -> u64 {
        self.now
    }

    /// Advance time by `seconds`
    pub fn advance(&mut self, seconds: u64) {
        self.now += seconds;
    }

    /// Advance time by whole days
    pub fn advance_days(&mut self, days: u64) {
        self.advance(days * SECONDS_PER_DAY);
    }

    /// Move the clock to `timestamp`; time never runs backwards
    pub fn set(&mut self, timestamp: u64) -> Result<(), ClockError> {
        if timestamp < self.now {
            return Err(ClockError::Backwards {
                now: self.now,
                requested: timestamp,
            });
        }
        self.now = timestamp;
        Ok(())
    }

    /// Whole days elapsed since `since`
    pub fn days_since(&self, since: u64) -> u64 {
        whole_days_between(since, self.now)
    }
}
