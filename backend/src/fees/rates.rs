//! Fee Terms and Basis-Point Arithmetic
//!
//! All rates are annual and expressed in basis points (0-10000). Intermediate
//! pro-rating happens in milli-basis-points (mbps) to keep sub-bps precision
//! without floating point.
//!
//! | Unit | 100% |
//! |------|------|
//! | bps  | 10_000 |
//! | mbps | 10_000_000 |

use serde::{Deserialize, Serialize};

use super::waterfall::FeeError;

/// 100% in basis points
pub const BPS_DENOMINATOR: u32 = 10_000;

/// Milli-basis-points per basis point
pub const MBPS_PER_BPS: u64 = 1_000;

/// 100% in milli-basis-points
pub const MBPS_DENOMINATOR: i128 = 10_000_000;

/// Apply a basis-point rate to an amount (floor)
///
/// # Example
/// ```
/// use factoring_pool_core_rs::fees::apply_bps;
///
/// assert_eq!(apply_bps(10_000, 25), 25);
/// assert_eq!(apply_bps(10_000, 8_000), 8_000);
/// ```
pub fn apply_bps(amount: i64, bps: u32) -> i64 {
    (amount as i128 * bps as i128 / BPS_DENOMINATOR as i128) as i64
}

/// Fee terms fixed for one position
///
/// Snapshotted at approval. Only `upfront_bps` changes afterwards: funding may
/// request a lower advance than the approved maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeTerms {
    /// Annual yield paid to depositors
    pub target_yield_bps: u32,
    /// Annual spread kept by the underwriter
    pub spread_bps: u32,
    /// Annual admin fee kept by the pool owner
    pub admin_fee_bps: u32,
    /// One-off protocol fee on face value, withheld at funding
    pub protocol_fee_bps: u32,
    /// Fraction of face value advanced at funding
    pub upfront_bps: u32,
}

impl FeeTerms {
    /// Reject any rate outside 0..=10000
    pub fn validate(&self) -> Result<(), FeeError> {
        for (name, value) in [
            ("target_yield_bps", self.target_yield_bps),
            ("spread_bps", self.spread_bps),
            ("admin_fee_bps", self.admin_fee_bps),
            ("protocol_fee_bps", self.protocol_fee_bps),
            ("upfront_bps", self.upfront_bps),
        ] {
            if value > BPS_DENOMINATOR {
                return Err(FeeError::RateOutOfRange { name, value });
            }
        }
        Ok(())
    }

    /// Sum of the three time-based annual rates
    pub fn annual_bps(&self) -> u32 {
        self.target_yield_bps + self.spread_bps + self.admin_fee_bps
    }

    /// Copy of these terms with a different advance rate
    pub fn with_upfront_bps(mut self, upfront_bps: u32) -> Self {
        self.upfront_bps = upfront_bps;
        self
    }
}
