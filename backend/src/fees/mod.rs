//! Fee Waterfall
//!
//! This module provides:
//! - Fee term configuration and basis-point arithmetic (`rates`)
//! - The stateless waterfall calculator that splits invoice proceeds into
//!   interest, spread, admin fee and kickback (`waterfall`)

pub mod rates;
pub mod waterfall;

// Re-exports
pub use rates::{apply_bps, FeeTerms, BPS_DENOMINATOR, MBPS_DENOMINATOR, MBPS_PER_BPS};
pub use waterfall::{
    calculate_fees, pro_rated_mbps, quote_funding, FeeBreakdown, FeeError, FeeSnapshot,
    FundingQuote,
};
