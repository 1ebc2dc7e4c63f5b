//! Fee Waterfall Calculator
//!
//! Converts a position's fee terms and elapsed time into the split of invoice
//! proceeds between depositors (interest), the underwriter (spread), the pool
//! owner (admin fee) and the original creditor (kickback).
//!
//! # Algorithm
//!
//! ```text
//! rate_i     = bps_i × 1000 × elapsed / SECONDS_PER_YEAR        (mbps, per component)
//! raw        = initial_face_value × Σ rate_i / 10_000_000
//! available  = invoice_amount − initial_paid − protocol_fee − net_funded
//! kickback_cap = initial_face_value − net_funded − protocol_fee
//! total      = max(min(raw, available), available − kickback_cap)
//! component_i = total × rate_i / Σ rate_i                         (admin takes the remainder)
//! kickback   = available − total
//! ```
//!
//! # Critical Invariants
//!
//! - **Purity**: no input is mutated; identical inputs give identical outputs
//! - **Conservation**: `interest + spread + admin_fee + kickback == available`
//! - **Cap**: kickback never exceeds `kickback_cap`
//! - **Floor ≤ ceiling**: a violation is reported as an error, never clamped

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::rates::{apply_bps, FeeTerms, MBPS_DENOMINATOR, MBPS_PER_BPS};
use crate::core::time::SECONDS_PER_YEAR;

/// Errors raised by the fee calculator
#[derive(Debug, Error, PartialEq)]
pub enum FeeError {
    #[error("{name} out of range: {value} (max 10000 bps)")]
    RateOutOfRange { name: &'static str, value: u32 },

    #[error("{name} must be non-negative, got {value}")]
    NegativeAmount { name: &'static str, value: i64 },

    #[error("Kickback cap is negative: initial face value {initial_face_value} < net funded {net_funded} + protocol fee {protocol_fee}")]
    NegativeKickbackCap {
        initial_face_value: i64,
        net_funded: i64,
        protocol_fee: i64,
    },

    #[error("Fee floor {floor} exceeds fee ceiling {ceiling}")]
    FloorAboveCeiling { floor: i64, ceiling: i64 },

    #[error("Advance {gross} plus protocol fee {protocol_fee} exceeds face value {face_value}")]
    AdvanceExceedsFaceValue {
        gross: i64,
        protocol_fee: i64,
        face_value: i64,
    },
}

/// Invoice and position amounts the waterfall is computed against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSnapshot {
    /// Current face value reported by the invoice provider
    pub invoice_amount: i64,
    /// Amount already paid on the invoice when it was approved
    pub initial_paid: i64,
    /// Face value the position was approved against (override or outstanding amount)
    pub initial_face_value: i64,
    /// Amount actually transferred to the creditor at funding
    pub net_funded: i64,
    /// Protocol fee withheld at funding
    pub protocol_fee: i64,
}

impl FeeSnapshot {
    fn validate(&self) -> Result<(), FeeError> {
        for (name, value) in [
            ("invoice_amount", self.invoice_amount),
            ("initial_paid", self.initial_paid),
            ("initial_face_value", self.initial_face_value),
            ("net_funded", self.net_funded),
            ("protocol_fee", self.protocol_fee),
        ] {
            if value < 0 {
                return Err(FeeError::NegativeAmount { name, value });
            }
        }
        Ok(())
    }

    /// Proceeds left for fees and kickback once the advance and protocol fee are recovered
    pub fn available(&self) -> i64 {
        (self.invoice_amount - self.initial_paid - self.protocol_fee - self.net_funded).max(0)
    }

    /// Largest kickback the original creditor may receive
    pub fn kickback_cap(&self) -> i64 {
        self.initial_face_value - self.net_funded - self.protocol_fee
    }
}

/// Result of a waterfall computation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeBreakdown {
    pub interest: i64,
    pub spread: i64,
    pub admin_fee: i64,
    pub kickback: i64,
}

impl FeeBreakdown {
    /// Interest + spread + admin fee
    pub fn total_fees(&self) -> i64 {
        self.interest + self.spread + self.admin_fee
    }
}

/// Amounts fixed at funding time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingQuote {
    /// Face value × upfront rate
    pub gross: i64,
    /// Face value × protocol fee rate
    pub protocol_fee: i64,
    /// Target fees until the due date, withheld from the advance
    pub interest: i64,
    pub spread: i64,
    pub admin_fee: i64,
    /// Amount transferred to the creditor
    pub net: i64,
}

impl FundingQuote {
    /// Fees withheld against the position (term fees + protocol fee)
    pub fn withheld_fees(&self) -> i64 {
        self.gross + self.protocol_fee - self.net
    }
}

/// Pro-rate an annual bps rate over `elapsed_secs`, in milli-basis-points
///
/// # Example
/// ```
/// use factoring_pool_core_rs::fees::pro_rated_mbps;
///
/// // 365 bps for one day is exactly 1 bps = 1000 mbps
/// assert_eq!(pro_rated_mbps(365, 86_400), 1_000);
/// assert_eq!(pro_rated_mbps(500, 0), 0);
/// ```
pub fn pro_rated_mbps(bps: u32, elapsed_secs: u64) -> i128 {
    bps as i128 * MBPS_PER_BPS as i128 * elapsed_secs as i128 / SECONDS_PER_YEAR as i128
}

/// Component rates for one elapsed period
#[derive(Debug, Clone, Copy)]
struct RateMix {
    interest: i128,
    spread: i128,
    admin: i128,
}

impl RateMix {
    fn new(terms: &FeeTerms, elapsed_secs: u64) -> Self {
        Self {
            interest: pro_rated_mbps(terms.target_yield_bps, elapsed_secs),
            spread: pro_rated_mbps(terms.spread_bps, elapsed_secs),
            admin: pro_rated_mbps(terms.admin_fee_bps, elapsed_secs),
        }
    }

    fn total(&self) -> i128 {
        self.interest + self.spread + self.admin
    }

    /// Raw (uncapped) fees on `face_value`
    fn raw_fees(&self, face_value: i64) -> i128 {
        face_value as i128 * self.total() / MBPS_DENOMINATOR
    }

    /// Split `total` in proportion to the rate mix; admin takes the rounding remainder
    fn apportion(&self, total: i128) -> (i64, i64, i64) {
        let mix_total = self.total();
        if mix_total == 0 {
            return (0, 0, 0);
        }
        let interest = total * self.interest / mix_total;
        let spread = total * self.spread / mix_total;
        let admin = total - interest - spread;
        (interest as i64, spread as i64, admin as i64)
    }
}

/// Compute the fee waterfall for a position
///
/// `elapsed_secs` is the time since funding (or, for a preview, any horizon).
/// The function is pure: it can be called at any time for previews.
///
/// # Errors
///
/// - `RateOutOfRange` / `NegativeAmount` for malformed inputs
/// - `NegativeKickbackCap` when the advance plus protocol fee exceed the approved face value
/// - `FloorAboveCeiling` if the kickback floor would force fees above what the invoice can pay
///
/// # Example
/// ```
/// use factoring_pool_core_rs::fees::{calculate_fees, FeeSnapshot, FeeTerms};
///
/// let terms = FeeTerms {
///     target_yield_bps: 730,
///     spread_bps: 0,
///     admin_fee_bps: 0,
///     protocol_fee_bps: 0,
///     upfront_bps: 8_000,
/// };
/// let snapshot = FeeSnapshot {
///     invoice_amount: 10_000,
///     initial_paid: 0,
///     initial_face_value: 10_000,
///     net_funded: 8_000,
///     protocol_fee: 0,
/// };
/// // 730 bps/year for 10 days = 20 bps of 10_000 = 20
/// let fees = calculate_fees(&terms, &snapshot, 10 * 86_400).unwrap();
/// assert_eq!(fees.interest, 20);
/// assert_eq!(fees.kickback, 2_000 - 20);
/// ```
pub fn calculate_fees(
    terms: &FeeTerms,
    snapshot: &FeeSnapshot,
    elapsed_secs: u64,
) -> Result<FeeBreakdown, FeeError> {
    terms.validate()?;
    snapshot.validate()?;

    let kickback_cap = snapshot.kickback_cap();
    if kickback_cap < 0 {
        return Err(FeeError::NegativeKickbackCap {
            initial_face_value: snapshot.initial_face_value,
            net_funded: snapshot.net_funded,
            protocol_fee: snapshot.protocol_fee,
        });
    }

    let ceiling = snapshot.available();
    let floor = (ceiling - kickback_cap).max(0);
    if floor > ceiling {
        return Err(FeeError::FloorAboveCeiling { floor, ceiling });
    }

    let mix = RateMix::new(terms, elapsed_secs);
    if mix.total() == 0 {
        // No rate to split by: anything above the kickback cap goes to depositors.
        return Ok(FeeBreakdown {
            interest: floor,
            spread: 0,
            admin_fee: 0,
            kickback: ceiling - floor,
        });
    }

    let total = mix
        .raw_fees(snapshot.initial_face_value)
        .min(ceiling as i128)
        .max(floor as i128);
    let (interest, spread, admin_fee) = mix.apportion(total);

    Ok(FeeBreakdown {
        interest,
        spread,
        admin_fee,
        kickback: ceiling - total as i64,
    })
}

/// Quote the amounts fixed at funding
///
/// Target fees run from funding to the due date (`secs_until_due`) and are
/// withheld from the advance, capped so the net advance never goes negative.
pub fn quote_funding(
    terms: &FeeTerms,
    face_value: i64,
    secs_until_due: u64,
) -> Result<FundingQuote, FeeError> {
    terms.validate()?;
    if face_value < 0 {
        return Err(FeeError::NegativeAmount {
            name: "face_value",
            value: face_value,
        });
    }

    let gross = apply_bps(face_value, terms.upfront_bps);
    let protocol_fee = apply_bps(face_value, terms.protocol_fee_bps);
    if gross + protocol_fee > face_value {
        return Err(FeeError::AdvanceExceedsFaceValue {
            gross,
            protocol_fee,
            face_value,
        });
    }

    let mix = RateMix::new(terms, secs_until_due);
    let withheld = mix.raw_fees(face_value).min(gross as i128);
    let (interest, spread, admin_fee) = mix.apportion(withheld);

    Ok(FundingQuote {
        gross,
        protocol_fee,
        interest,
        spread,
        admin_fee,
        net: gross - withheld as i64,
    })
}
