//! Aggregate Accrual Tracker
//!
//! Answers "how much interest has accrued across all active positions" in
//! O(1), without iterating positions.
//!
//! # Model
//!
//! Each position accrues a fixed `daily_rate` for every day boundary
//! (00:00 UTC) crossed since it was funded. The tracker keeps:
//!
//! ```text
//! total_daily_rate       Σ daily_rate over active positions
//! checkpoint_timestamp   last time the running total was rolled forward
//! accrued_at_checkpoint  interest accrued up to checkpoint_timestamp
//!
//! query(t) = accrued_at_checkpoint + total_daily_rate × days(checkpoint_timestamp, t)
//! ```
//!
//! Days are counted as day-index differences rather than `floor(Δt / 1 day)`:
//! the sum of per-position contributions is then exactly linear, so a
//! checkpoint taken mid-day never drops a partial day from any position.
//!
//! # Critical Invariants
//!
//! - `query(t) == Σ daily_rate_i × days(funded_at_i, t)` over active positions
//! - A departing position removes exactly its own contribution
//! - `checkpoint` is idempotent within the same second
//!
//! All rates and accrued values are scaled by [`ACCRUAL_SCALE`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::time::SECONDS_PER_DAY;
use crate::fees::BPS_DENOMINATOR;

/// Fixed-point scale applied to daily rates and accrued totals
pub const ACCRUAL_SCALE: i128 = 1_000_000_000;

/// Errors raised by the accrual tracker
#[derive(Debug, Error, PartialEq)]
pub enum AccrualError {
    #[error("Removing contribution {contribution} exceeds accrued total {accrued}")]
    ContributionExceedsAccrued { contribution: i128, accrued: i128 },

    #[error("Removing daily rate {rate} exceeds total daily rate {total}")]
    RateExceedsTotal { rate: i128, total: i128 },

    #[error("Daily rate must be non-negative, got {0}")]
    NegativeRate(i128),
}

/// Daily interest rate of a position (scaled by [`ACCRUAL_SCALE`])
///
/// `face_value × target_yield / 365`, fixed once at funding.
///
/// # Example
/// ```
/// use factoring_pool_core_rs::models::accrual::{daily_rate, ACCRUAL_SCALE};
///
/// // 10% on 365_000 is 100 per day
/// assert_eq!(daily_rate(365_000, 1_000), 100 * ACCRUAL_SCALE);
/// ```
pub fn daily_rate(face_value: i64, target_yield_bps: u32) -> i128 {
    face_value as i128 * target_yield_bps as i128 * ACCRUAL_SCALE
        / (BPS_DENOMINATOR as i128 * 365)
}

/// Accrual days between two timestamps
///
/// Counts UTC day boundaries (midnights) crossed, not 24-hour spans: a
/// position funded at 23:00 has accrued one day at 00:00 the next morning.
pub fn accrual_days(from: u64, to: u64) -> u64 {
    (to / SECONDS_PER_DAY).saturating_sub(from / SECONDS_PER_DAY)
}

/// Checkpoint-based running total of interest accrued by active positions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccrualTracker {
    total_daily_rate: i128,
    checkpoint_timestamp: u64,
    accrued_at_checkpoint: i128,
}

impl AccrualTracker {
    /// Create an empty tracker anchored at `now`
    pub fn new(now: u64) -> Self {
        Self {
            total_daily_rate: 0,
            checkpoint_timestamp: now,
            accrued_at_checkpoint: 0,
        }
    }

    /// Sum of daily rates of all active positions
    pub fn total_daily_rate(&self) -> i128 {
        self.total_daily_rate
    }

    /// Timestamp of the last checkpoint
    pub fn checkpoint_timestamp(&self) -> u64 {
        self.checkpoint_timestamp
    }

    /// Accrued total as of the last checkpoint
    pub fn accrued_at_checkpoint(&self) -> i128 {
        self.accrued_at_checkpoint
    }

    /// Roll the accrued total forward to `now`
    pub fn checkpoint(&mut self, now: u64) {
        if now <= self.checkpoint_timestamp {
            return;
        }
        self.accrued_at_checkpoint +=
            self.total_daily_rate * accrual_days(self.checkpoint_timestamp, now) as i128;
        self.checkpoint_timestamp = now;
    }

    /// Register a newly funded position
    pub fn add_position(&mut self, rate: i128, now: u64) -> Result<(), AccrualError> {
        if rate < 0 {
            return Err(AccrualError::NegativeRate(rate));
        }
        self.checkpoint(now);
        self.total_daily_rate += rate;
        Ok(())
    }

    /// Remove a departing position and exactly its own accrued contribution
    ///
    /// Returns the removed contribution (scaled).
    pub fn remove_position(
        &mut self,
        rate: i128,
        funded_at: u64,
        now: u64,
    ) -> Result<i128, AccrualError> {
        if rate < 0 {
            return Err(AccrualError::NegativeRate(rate));
        }
        if rate > self.total_daily_rate {
            return Err(AccrualError::RateExceedsTotal {
                rate,
                total: self.total_daily_rate,
            });
        }

        // Validate against the rolled-forward total before touching state
        let now = now.max(self.checkpoint_timestamp);
        let rolled = self.query(now);
        let contribution = rate * accrual_days(funded_at, now) as i128;
        if contribution > rolled {
            return Err(AccrualError::ContributionExceedsAccrued {
                contribution,
                accrued: rolled,
            });
        }

        self.checkpoint(now);
        self.accrued_at_checkpoint -= contribution;
        self.total_daily_rate -= rate;
        Ok(contribution)
    }

    /// Accrued total at `now` (scaled), without mutating state
    ///
    /// Each position contributes its daily rate times [`accrual_days`] since
    /// funding, so "days since funded" means UTC day boundaries crossed. On a
    /// day-aligned clock this equals `floor((now - funded_at) / 1 day)`.
    pub fn query(&self, now: u64) -> i128 {
        self.accrued_at_checkpoint
            + self.total_daily_rate * accrual_days(self.checkpoint_timestamp, now) as i128
    }

    /// Accrued total at `now` in asset units (floor)
    pub fn query_assets(&self, now: u64) -> i64 {
        (self.query(now) / ACCRUAL_SCALE) as i64
    }
}
