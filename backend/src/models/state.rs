//! Pool State
//!
//! The explicit accounting context: every aggregate the pool maintains lives
//! here and is passed to the operations that need it. There is no hidden
//! global state.
//!
//! # Critical Invariants
//!
//! 1. **Ledger identity**: `capital_at_risk == Σ(gross + protocol_fee)` and
//!    `withheld_fees == Σ(gross + protocol_fee − net)` over funded positions
//! 2. **Accrual identity**: tracker's total daily rate equals `Σ daily_rate`
//!    over funded positions
//! 3. **Cash identity**: `asset_balance == capital_account − Σ(net + protocol_fee)
//!    + fee balances` (funded positions only)
//! 4. **Queue validity**: head on the first live entry, one live entry per owner

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::models::accrual::{AccrualTracker, ACCRUAL_SCALE};
use crate::models::capital::CapitalLedger;
use crate::models::position::{Position, PositionStatus};
use crate::models::redemption_queue::RedemptionQueue;
use crate::models::shares::ShareLedger;
use crate::providers::{InvoiceId, RoutingCache};

/// A broken accounting invariant
#[derive(Debug, Error, PartialEq)]
#[error("State invariant violated: {0}")]
pub struct StateError(pub String);

/// Components of the depositors' capital account
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapitalAccount {
    pub deposits: i64,
    pub redemptions: i64,
    /// Interest realized on settled positions
    pub realized_interest: i64,
    /// Write-downs of impaired positions
    pub realized_losses: i64,
    /// Principal recovered on impaired positions that later paid
    pub recoveries: i64,
}

impl CapitalAccount {
    pub fn total(&self) -> i64 {
        self.deposits - self.redemptions + self.realized_interest - self.realized_losses
            + self.recoveries
    }
}

/// Fees earned by the pool operators, held until withdrawn
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeBalances {
    pub admin_fees: i64,
    pub spread_gains: i64,
    pub protocol_fees: i64,
}

impl FeeBalances {
    pub fn total(&self) -> i64 {
        self.admin_fees + self.spread_gains + self.protocol_fees
    }
}

/// Complete accounting state of the pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolState {
    positions: BTreeMap<InvoiceId, Position>,
    pub(crate) tracker: AccrualTracker,
    pub(crate) ledger: CapitalLedger,
    pub(crate) queue: RedemptionQueue,
    pub(crate) shares: ShareLedger,
    pub(crate) capital: CapitalAccount,
    pub(crate) fees: FeeBalances,
    pub(crate) routes: RoutingCache,
    /// Assets physically held by the pool
    pub(crate) asset_balance: i64,
}

impl PoolState {
    /// Create an empty state anchored at `now`
    pub fn new(now: u64, max_queue_length: usize) -> Self {
        Self {
            positions: BTreeMap::new(),
            tracker: AccrualTracker::new(now),
            ledger: CapitalLedger::new(),
            queue: RedemptionQueue::new(max_queue_length),
            shares: ShareLedger::new(),
            capital: CapitalAccount::default(),
            fees: FeeBalances::default(),
            routes: RoutingCache::new(),
            asset_balance: 0,
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn position(&self, id: InvoiceId) -> Option<&Position> {
        self.positions.get(&id)
    }

    pub(crate) fn position_mut(&mut self, id: InvoiceId) -> Option<&mut Position> {
        self.positions.get_mut(&id)
    }

    pub(crate) fn insert_position(&mut self, position: Position) {
        self.positions.insert(position.invoice_id, position);
    }

    pub(crate) fn remove_position(&mut self, id: InvoiceId) -> Option<Position> {
        self.positions.remove(&id)
    }

    pub fn positions(&self) -> &BTreeMap<InvoiceId, Position> {
        &self.positions
    }

    /// Funded positions (members of the tracker and ledger)
    pub fn active_positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values().filter(|p| p.is_funded())
    }

    pub fn impaired_positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values().filter(|p| p.is_impaired())
    }

    pub fn tracker(&self) -> &AccrualTracker {
        &self.tracker
    }

    pub fn ledger(&self) -> &CapitalLedger {
        &self.ledger
    }

    pub fn queue(&self) -> &RedemptionQueue {
        &self.queue
    }

    pub fn shares(&self) -> &ShareLedger {
        &self.shares
    }

    pub fn capital(&self) -> &CapitalAccount {
        &self.capital
    }

    pub fn fee_balances(&self) -> &FeeBalances {
        &self.fees
    }

    pub fn routes(&self) -> &RoutingCache {
        &self.routes
    }

    pub fn asset_balance(&self) -> i64 {
        self.asset_balance
    }

    // ========================================================================
    // Derived figures
    // ========================================================================

    pub fn capital_account(&self) -> i64 {
        self.capital.total()
    }

    /// Liquidity free for funding and redemptions
    pub fn available_liquidity(&self) -> i64 {
        self.ledger.available_liquidity(self.capital_account())
    }

    /// Interest accrued but not yet realized, in asset units
    pub fn accrued_interest(&self, now: u64) -> i64 {
        self.tracker.query_assets(now)
    }

    /// Assets backing the share supply
    pub fn total_assets(&self, now: u64) -> i64 {
        (self.capital_account() + self.accrued_interest(now)).max(0)
    }

    // ========================================================================
    // Invariant checks
    // ========================================================================

    /// Recompute every aggregate from the position set and compare
    ///
    /// O(positions); meant for tests, checkpoint restore and audits.
    pub fn check_invariants(&self) -> Result<(), StateError> {
        let mut capital_at_risk = 0i64;
        let mut withheld = 0i64;
        let mut daily_rate = 0i128;
        let mut outstanding = 0i64;
        for p in self.active_positions() {
            capital_at_risk += p.capital_reserved();
            withheld += p.capital_reserved() - p.net_funded;
            daily_rate += p.daily_rate;
            outstanding += p.net_funded + p.protocol_fee;
        }

        if capital_at_risk != self.ledger.capital_at_risk() {
            return Err(StateError(format!(
                "capital at risk {} != Σ positions {}",
                self.ledger.capital_at_risk(),
                capital_at_risk
            )));
        }
        if withheld != self.ledger.withheld_fees() {
            return Err(StateError(format!(
                "withheld fees {} != Σ positions {}",
                self.ledger.withheld_fees(),
                withheld
            )));
        }
        if daily_rate != self.tracker.total_daily_rate() {
            return Err(StateError(format!(
                "total daily rate {} != Σ positions {}",
                self.tracker.total_daily_rate(),
                daily_rate
            )));
        }

        let expected_cash = self.capital_account() - outstanding + self.fees.total();
        if expected_cash != self.asset_balance {
            return Err(StateError(format!(
                "asset balance {} != expected {}",
                self.asset_balance, expected_cash
            )));
        }

        if self
            .positions
            .values()
            .any(|p| p.status == PositionStatus::Funded && p.funded_at.is_none())
        {
            return Err(StateError("funded position without timestamp".to_string()));
        }
        Ok(())
    }

    /// Σ daily_rate × accrual days over funded positions (scaled); O(positions)
    pub fn accrued_by_positions(&self, now: u64) -> i128 {
        self.active_positions()
            .map(|p| {
                p.daily_rate
                    * crate::models::accrual::accrual_days(p.funded_at.unwrap_or(now), now) as i128
            })
            .sum()
    }

    /// Accrued interest in asset units computed position by position
    pub fn accrued_interest_slow(&self, now: u64) -> i64 {
        (self.accrued_by_positions(now) / ACCRUAL_SCALE) as i64
    }
}
