//! Depositor share ledger
//!
//! Tracks share balances and supply. Conversion between shares and assets is
//! proportional to the pool's total assets, with explicit rounding so the pool
//! never pays out more than a share is worth.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors raised by the share ledger
#[derive(Debug, Error, PartialEq)]
pub enum ShareError {
    #[error("Share amount must be positive, got {0}")]
    InvalidAmount(i64),

    #[error("Insufficient shares for {owner}: required {required}, held {held}")]
    InsufficientShares {
        owner: String,
        required: i64,
        held: i64,
    },
}

/// Rounding direction for share/asset conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    Down,
    Up,
}

fn mul_div(value: i64, numerator: i64, denominator: i64, rounding: Rounding) -> i64 {
    if denominator <= 0 {
        return value;
    }
    let product = value as i128 * numerator as i128;
    let denominator = denominator as i128;
    let quotient = product / denominator;
    match rounding {
        Rounding::Up if product % denominator != 0 => (quotient + 1) as i64,
        _ => quotient as i64,
    }
}

/// Share balances per depositor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareLedger {
    balances: BTreeMap<String, i64>,
    total_supply: i64,
}

impl ShareLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_supply(&self) -> i64 {
        self.total_supply
    }

    pub fn balance_of(&self, owner: &str) -> i64 {
        self.balances.get(owner).copied().unwrap_or(0)
    }

    pub fn balances(&self) -> &BTreeMap<String, i64> {
        &self.balances
    }

    /// Shares worth `assets` given `total_assets`
    ///
    /// 1:1 while supply is zero. Shares with nothing backing them have no
    /// price, so no assets convert into them (returns 0).
    pub fn convert_to_shares(&self, assets: i64, total_assets: i64, rounding: Rounding) -> i64 {
        if self.total_supply == 0 {
            return assets;
        }
        if total_assets <= 0 {
            return 0;
        }
        mul_div(assets, self.total_supply, total_assets, rounding)
    }

    /// Assets worth `shares` given `total_assets`
    pub fn convert_to_assets(&self, shares: i64, total_assets: i64, rounding: Rounding) -> i64 {
        if self.total_supply == 0 {
            return shares;
        }
        mul_div(shares, total_assets, self.total_supply, rounding)
    }

    pub fn mint(&mut self, owner: &str, shares: i64) -> Result<(), ShareError> {
        if shares <= 0 {
            return Err(ShareError::InvalidAmount(shares));
        }
        *self.balances.entry(owner.to_string()).or_insert(0) += shares;
        self.total_supply += shares;
        Ok(())
    }

    pub fn burn(&mut self, owner: &str, shares: i64) -> Result<(), ShareError> {
        if shares <= 0 {
            return Err(ShareError::InvalidAmount(shares));
        }
        let held = self.balance_of(owner);
        if held < shares {
            return Err(ShareError::InsufficientShares {
                owner: owner.to_string(),
                required: shares,
                held,
            });
        }
        if held == shares {
            self.balances.remove(owner);
        } else {
            self.balances.insert(owner.to_string(), held - shares);
        }
        self.total_supply -= shares;
        Ok(())
    }
}
