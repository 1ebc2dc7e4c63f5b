//! Capital-at-Risk Ledger
//!
//! Running totals of pool capital tied up in active positions.
//!
//! ```text
//! on_fund(gross, protocol_fee, net):
//!     capital_at_risk += gross + protocol_fee
//!     withheld_fees   += gross + protocol_fee − net
//! on_release(...)  inverse subtraction
//! available_liquidity(capital_account) = capital_account − capital_at_risk
//! ```
//!
//! # Critical Invariants
//!
//! - `capital_at_risk == Σ (gross + protocol_fee)` over active positions
//! - `withheld_fees == Σ (gross + protocol_fee − net)` over active positions
//! - Funding never reserves more than the liquidity available before the update
//!
//! CRITICAL: All money values are i64 (smallest asset unit)

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the capital ledger
#[derive(Debug, Error, PartialEq)]
pub enum LedgerError {
    #[error("Insufficient liquidity: required {required}, available {available}")]
    InsufficientLiquidity { required: i64, available: i64 },

    #[error("Invalid funding amounts: gross {gross}, protocol fee {protocol_fee}, net {net}")]
    InvalidAmounts {
        gross: i64,
        protocol_fee: i64,
        net: i64,
    },

    #[error("Releasing {amount} exceeds capital at risk {capital_at_risk}")]
    ReleaseExceedsReserved { amount: i64, capital_at_risk: i64 },
}

/// Capital reserved by active positions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapitalLedger {
    capital_at_risk: i64,
    withheld_fees: i64,
}

impl CapitalLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Gross funded amount plus protocol fees over active positions
    pub fn capital_at_risk(&self) -> i64 {
        self.capital_at_risk
    }

    /// Fees withheld from advances over active positions
    pub fn withheld_fees(&self) -> i64 {
        self.withheld_fees
    }

    /// Liquidity free for new positions and redemptions
    pub fn available_liquidity(&self, capital_account: i64) -> i64 {
        (capital_account - self.capital_at_risk).max(0)
    }

    fn check_amounts(gross: i64, protocol_fee: i64, net: i64) -> Result<(), LedgerError> {
        if gross < 0 || protocol_fee < 0 || net < 0 || net > gross {
            return Err(LedgerError::InvalidAmounts {
                gross,
                protocol_fee,
                net,
            });
        }
        Ok(())
    }

    /// Reserve capital for a newly funded position
    ///
    /// Fails with `InsufficientLiquidity` (and leaves the ledger untouched) if
    /// `gross + protocol_fee` exceeds the liquidity available before the update.
    ///
    /// # Example
    /// ```
    /// use factoring_pool_core_rs::models::capital::{CapitalLedger, LedgerError};
    ///
    /// let mut ledger = CapitalLedger::new();
    /// ledger.on_fund(8_000, 25, 7_939, 10_000).unwrap();
    /// assert_eq!(ledger.capital_at_risk(), 8_025);
    /// assert_eq!(ledger.withheld_fees(), 86);
    /// assert_eq!(ledger.available_liquidity(10_000), 1_975);
    ///
    /// let err = ledger.on_fund(2_000, 0, 2_000, 10_000).unwrap_err();
    /// assert_eq!(err, LedgerError::InsufficientLiquidity { required: 2_000, available: 1_975 });
    /// ```
    pub fn on_fund(
        &mut self,
        gross: i64,
        protocol_fee: i64,
        net: i64,
        capital_account: i64,
    ) -> Result<(), LedgerError> {
        Self::check_amounts(gross, protocol_fee, net)?;

        let required = gross + protocol_fee;
        let available = self.available_liquidity(capital_account);
        if required > available {
            return Err(LedgerError::InsufficientLiquidity {
                required,
                available,
            });
        }

        self.capital_at_risk += required;
        self.withheld_fees += required - net;
        Ok(())
    }

    /// Release the capital of a position leaving the pool (payoff, unfactor, impairment)
    pub fn on_release(&mut self, gross: i64, protocol_fee: i64, net: i64) -> Result<(), LedgerError> {
        Self::check_amounts(gross, protocol_fee, net)?;

        let amount = gross + protocol_fee;
        if amount > self.capital_at_risk || amount - net > self.withheld_fees {
            return Err(LedgerError::ReleaseExceedsReserved {
                amount,
                capital_at_risk: self.capital_at_risk,
            });
        }

        self.capital_at_risk -= amount;
        self.withheld_fees -= amount - net;
        Ok(())
    }
}
