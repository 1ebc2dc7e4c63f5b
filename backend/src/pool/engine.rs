//! Factoring Pool Engine
//!
//! The facade that ties the accounting core together. Every exposed
//! operation reads `now` from the pool's [`Clock`], validates fully, and then
//! mutates the aggregates in one step:
//!
//! ```text
//! approve ──► fund ──► (time passes) ──► reconcile / unfactor / impair
//!               │                              │
//!               ├─ AccrualTracker.add          ├─ AccrualTracker.remove
//!               └─ CapitalLedger.on_fund       ├─ CapitalLedger.on_release
//!                                              └─ fee balances, kickback
//!
//! deposit / redeem / withdraw ──► ShareLedger + RedemptionQueue
//! process_queue ──► serve queued redemptions from freed liquidity
//! ```
//!
//! # Critical Invariants
//!
//! 1. **Atomicity**: a failed operation leaves state and event log untouched
//! 2. **Ledger identity**: ledger totals equal the sums over funded positions
//! 3. **Cash identity**: asset balance equals capital account minus capital
//!    deployed (net + protocol fee) plus fee balances
//! 4. **Exactly once**: a position leaves the tracker and the ledger once
//!
//! # Example
//!
//! ```rust
//! use factoring_pool_core_rs::pool::{FactoringPool, PoolConfig};
//! use factoring_pool_core_rs::providers::{AllowAll, InMemoryInvoiceProvider, InvoiceDetails};
//!
//! let start = 1_700_006_400;
//! let config = PoolConfig::new("USDC", "owner", "underwriter", "treasury")
//!     .with_admin_fee_bps(50)
//!     .with_protocol_fee_bps(25);
//!
//! let mut provider = InMemoryInvoiceProvider::new("0xinvoices");
//! provider.insert(1, InvoiceDetails::new(10_000, start + 30 * 86_400, "acme", "buyer", "USDC"));
//!
//! let mut pool = FactoringPool::new(config, start, provider, AllowAll, AllowAll).unwrap();
//! pool.deposit("alice", "alice", 100_000).unwrap();
//! pool.approve("underwriter", 1, 500, 200, 8_000, 0).unwrap();
//!
//! let quote = pool.fund("acme", 1, 8_000, "acme").unwrap();
//! assert_eq!(quote.gross, 8_000);
//! assert_eq!(quote.protocol_fee, 25);
//! assert!(pool.state().check_invariants().is_ok());
//! ```

use log::{debug, info, warn};

use crate::core::time::Clock;
use crate::fees::{calculate_fees, quote_funding, FeeBreakdown, FeeTerms, FundingQuote, BPS_DENOMINATOR};
use crate::models::accrual::daily_rate;
use crate::models::event::{Event, EventLog};
use crate::models::position::{Position, PositionStatus};
use crate::models::redemption_queue::{Canceller, QueueEntry, RedemptionRequest};
use crate::models::shares::Rounding;
use crate::models::state::PoolState;
use crate::pool::config::PoolConfig;
use crate::pool::error::PoolError;
use crate::providers::{InvoiceDetails, InvoiceId, InvoiceProvider, Permissions};
use crate::settlement::{self, QueueProcessingResult, RedemptionOutcome};

// ============================================================================
// Operation Results
// ============================================================================

/// Outcome of an early exit by the creditor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnfactorOutcome {
    pub interest: i64,
    pub spread: i64,
    pub admin_fee: i64,
    /// Net advance + protocol fee + fees to date
    pub owed: i64,
    /// Payments the pool received on the invoice since approval
    pub payments: i64,
    /// `owed − payments`: positive is a claim on the creditor, negative a refund
    pub settlement: i64,
}

/// Outcome of a keeper sweep
///
/// A failed reconcile leaves its position untouched and does not stop the
/// sweep, so `settled` always lists everything that was committed.
#[derive(Debug, Default, PartialEq)]
pub struct SweepResult {
    pub settled: Vec<(InvoiceId, FeeBreakdown)>,
    pub failed: Vec<(InvoiceId, PoolError)>,
}

// ============================================================================
// Factoring Pool
// ============================================================================

/// Invoice factoring pool
///
/// Generic over the invoice source and the permission allow-lists so the
/// accounting core can run against any registry.
#[derive(Debug)]
pub struct FactoringPool<P: InvoiceProvider, A: Permissions> {
    pub(crate) config: PoolConfig,
    pub(crate) clock: Clock,
    pub(crate) state: PoolState,
    pub(crate) provider: P,
    pub(crate) deposit_permissions: A,
    pub(crate) factoring_permissions: A,
    pub(crate) event_log: EventLog,
}

impl<P: InvoiceProvider, A: Permissions> FactoringPool<P, A> {
    /// Create an empty pool at `start` (unix seconds)
    pub fn new(
        config: PoolConfig,
        start: u64,
        provider: P,
        deposit_permissions: A,
        factoring_permissions: A,
    ) -> Result<Self, PoolError> {
        config.validate()?;
        let state = PoolState::new(start, config.max_queue_length);
        info!("factoring pool created for asset {}", config.asset);

        Ok(Self {
            config,
            clock: Clock::new(start),
            state,
            provider,
            deposit_permissions,
            factoring_permissions,
            event_log: EventLog::new(),
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn state(&self) -> &PoolState {
        &self.state
    }

    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Mutable access to the invoice source (payments, transfers in tests)
    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    pub fn deposit_permissions_mut(&mut self) -> &mut A {
        &mut self.deposit_permissions
    }

    pub fn factoring_permissions_mut(&mut self) -> &mut A {
        &mut self.factoring_permissions
    }

    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    pub fn advance_time(&mut self, seconds: u64) {
        self.clock.advance(seconds);
    }

    pub fn advance_days(&mut self, days: u64) {
        self.clock.advance_days(days);
    }

    pub fn position(&self, id: InvoiceId) -> Option<&Position> {
        self.state.position(id)
    }

    // ========================================================================
    // Guards
    // ========================================================================

    fn require(&self, caller: &str, expected: &str, action: &'static str) -> Result<(), PoolError> {
        if caller != expected {
            return Err(PoolError::Unauthorized {
                caller: caller.to_string(),
                action,
            });
        }
        Ok(())
    }

    fn require_owner(&self, caller: &str, action: &'static str) -> Result<(), PoolError> {
        self.require(caller, &self.config.owner, action)
    }

    fn check_bps(name: &'static str, value: u32) -> Result<(), PoolError> {
        if value > BPS_DENOMINATOR {
            return Err(PoolError::InvalidBps { name, value });
        }
        Ok(())
    }

    fn check_amount(name: &'static str, value: i64) -> Result<(), PoolError> {
        if value <= 0 {
            return Err(PoolError::InvalidAmount { name, value });
        }
        Ok(())
    }

    /// Position that is funded or impaired (still owed money)
    fn outstanding_position(&self, id: InvoiceId) -> Result<&Position, PoolError> {
        let position = self
            .state
            .position(id)
            .ok_or(PoolError::InvoiceNotApproved(id))?;
        if position.status == PositionStatus::Approved {
            return Err(PoolError::NotFunded(id));
        }
        Ok(position)
    }

    fn funded_position(&self, id: InvoiceId) -> Result<&Position, PoolError> {
        let position = self.outstanding_position(id)?;
        if !position.is_funded() {
            return Err(PoolError::NotFunded(id));
        }
        Ok(position)
    }

    // ========================================================================
    // Underwriting
    // ========================================================================

    /// Approve an invoice for funding
    ///
    /// Snapshots fee terms, the invoice's creditor and paid amount. A
    /// `face_value_override` of 0 prices the position on the outstanding
    /// amount. Re-approving an unfunded invoice replaces the approval.
    pub fn approve(
        &mut self,
        caller: &str,
        id: InvoiceId,
        target_yield_bps: u32,
        spread_bps: u32,
        upfront_bps: u32,
        face_value_override: i64,
    ) -> Result<(), PoolError> {
        let now = self.now();
        self.require(caller, &self.config.underwriter, "approve invoices")?;
        Self::check_bps("target_yield_bps", target_yield_bps)?;
        Self::check_bps("spread_bps", spread_bps)?;
        Self::check_bps("upfront_bps", upfront_bps)?;
        if face_value_override < 0 {
            return Err(PoolError::InvalidAmount {
                name: "face_value_override",
                value: face_value_override,
            });
        }

        if let Some(existing) = self.state.position(id) {
            if existing.status != PositionStatus::Approved {
                return Err(PoolError::AlreadyFunded(id));
            }
        }

        let details = self.provider.invoice_details(id)?;
        if details.is_fully_paid() {
            return Err(PoolError::AlreadyPaid(id));
        }
        if details.is_canceled {
            return Err(PoolError::InvoiceCanceled(id));
        }
        if details.token != self.config.asset {
            return Err(PoolError::CurrencyMismatch {
                invoice: details.token,
                pool: self.config.asset.clone(),
            });
        }
        if details.due_date <= now {
            return Err(PoolError::AlreadyDue {
                id,
                due_date: details.due_date,
                now,
            });
        }

        let initial_face_value = if face_value_override == 0 {
            details.outstanding()
        } else {
            face_value_override
        };
        Self::check_amount("initial_face_value", initial_face_value)?;

        let terms = FeeTerms {
            target_yield_bps,
            spread_bps,
            admin_fee_bps: self.config.admin_fee_bps,
            protocol_fee_bps: self.config.protocol_fee_bps,
            upfront_bps,
        };
        // Terms whose advance could never be funded are rejected up front
        quote_funding(&terms, initial_face_value, details.due_date - now)?;

        self.state.routes.ensure(id, &mut self.provider)?;

        let InvoiceDetails {
            creditor,
            due_date,
            paid_amount,
            impairment_grace_period,
            ..
        } = details;
        self.state.insert_position(Position::approved(
            id,
            now,
            creditor,
            due_date,
            impairment_grace_period,
            initial_face_value,
            paid_amount,
            terms,
        ));

        self.event_log.log(Event::InvoiceApproved {
            timestamp: now,
            invoice_id: id,
            target_yield_bps,
            spread_bps,
            upfront_bps,
            initial_face_value,
        });
        info!(
            "invoice {} approved: face {}, yield {} bps, upfront {} bps",
            id, initial_face_value, target_yield_bps, upfront_bps
        );
        Ok(())
    }

    /// Quote funding an approved invoice at `upfront_bps`, without mutating
    pub fn preview_funding(&self, id: InvoiceId, upfront_bps: u32) -> Result<FundingQuote, PoolError> {
        let position = self
            .state
            .position(id)
            .ok_or(PoolError::InvoiceNotApproved(id))?;
        let terms = position.fee_terms.with_upfront_bps(upfront_bps);
        let until_due = position.due_date.saturating_sub(self.now());
        Ok(quote_funding(&terms, position.initial_face_value, until_due)?)
    }

    // ========================================================================
    // Funding
    // ========================================================================

    /// Advance funds against an approved invoice
    ///
    /// The caller must be the invoice's current creditor and pass the
    /// factoring allow-list. Invoice data must match the approval snapshot.
    pub fn fund(
        &mut self,
        caller: &str,
        id: InvoiceId,
        requested_upfront_bps: u32,
        receiver: &str,
    ) -> Result<FundingQuote, PoolError> {
        let now = self.now();
        if !self.factoring_permissions.is_allowed(caller) {
            return Err(PoolError::NotPermitted {
                identity: caller.to_string(),
            });
        }

        let position = self
            .state
            .position(id)
            .ok_or(PoolError::InvoiceNotApproved(id))?;
        if position.status != PositionStatus::Approved {
            return Err(PoolError::AlreadyFunded(id));
        }

        let details = self.provider.invoice_details(id)?;
        if caller != details.creditor {
            return Err(PoolError::Unauthorized {
                caller: caller.to_string(),
                action: "fund an invoice it does not hold",
            });
        }

        let expires_at = position
            .approved_at
            .saturating_add(self.config.approval_duration_secs);
        if now > expires_at {
            return Err(PoolError::ApprovalExpired {
                id,
                expired_at: expires_at,
            });
        }
        if details.is_canceled {
            return Err(PoolError::InvoiceCanceled(id));
        }
        if details.paid_amount != position.initial_paid {
            return Err(PoolError::PaidAmountChanged {
                id,
                approved: position.initial_paid,
                current: details.paid_amount,
            });
        }
        if details.creditor != position.creditor {
            return Err(PoolError::CreditorChanged {
                id,
                approved: position.creditor.clone(),
                current: details.creditor,
            });
        }
        if position.due_date <= now {
            return Err(PoolError::AlreadyDue {
                id,
                due_date: position.due_date,
                now,
            });
        }
        if requested_upfront_bps == 0 {
            return Err(PoolError::InvalidBps {
                name: "requested_upfront_bps",
                value: 0,
            });
        }
        if requested_upfront_bps > position.fee_terms.upfront_bps {
            return Err(PoolError::UpfrontExceedsApproved {
                requested: requested_upfront_bps,
                approved: position.fee_terms.upfront_bps,
            });
        }
        self.state.routes().get(id)?;

        let terms = position.fee_terms.with_upfront_bps(requested_upfront_bps);
        let quote = quote_funding(&terms, position.initial_face_value, position.due_date - now)?;
        let rate = daily_rate(position.initial_face_value, terms.target_yield_bps);

        let required = quote.gross + quote.protocol_fee;
        let available = self.state.available_liquidity();
        if required > available {
            return Err(PoolError::InsufficientLiquidity {
                required,
                available,
            });
        }

        // All checks passed: reserve capital and start accruing
        let capital_account = self.state.capital_account();
        self.state
            .ledger
            .on_fund(quote.gross, quote.protocol_fee, quote.net, capital_account)?;
        self.state.tracker.add_position(rate, now)?;
        self.state.fees.protocol_fees += quote.protocol_fee;
        self.state.asset_balance -= quote.net;
        self.state.routes.set_callback(id, true)?;

        if let Some(position) = self.state.position_mut(id) {
            position.status = PositionStatus::Funded;
            position.receiver = Some(receiver.to_string());
            position.funded_at = Some(now);
            position.gross_funded = quote.gross;
            position.net_funded = quote.net;
            position.protocol_fee = quote.protocol_fee;
            position.fee_terms = terms;
            position.daily_rate = rate;
        }

        self.event_log.log(Event::InvoiceFunded {
            timestamp: now,
            invoice_id: id,
            receiver: receiver.to_string(),
            upfront_bps: requested_upfront_bps,
            gross: quote.gross,
            net: quote.net,
            protocol_fee: quote.protocol_fee,
        });
        info!(
            "invoice {} funded: gross {}, net {}, protocol fee {}",
            id, quote.gross, quote.net, quote.protocol_fee
        );
        Ok(quote)
    }

    // ========================================================================
    // Settlement of positions
    // ========================================================================

    /// Take a position out of the tracker and the ledger
    fn release_position(&mut self, position: &Position, now: u64) -> Result<(), PoolError> {
        let funded_at = position.funded_at.unwrap_or(now);
        self.state
            .tracker
            .remove_position(position.daily_rate, funded_at, now)?;
        self.state.ledger.on_release(
            position.gross_funded,
            position.protocol_fee,
            position.net_funded,
        )?;
        Ok(())
    }

    /// Settle a paid invoice through the fee waterfall
    ///
    /// Works for funded and impaired positions. The position is removed from
    /// the pool exactly once; a second call fails with `InvoiceNotApproved`.
    pub fn reconcile(&mut self, id: InvoiceId) -> Result<FeeBreakdown, PoolError> {
        let now = self.now();
        let position = self.outstanding_position(id)?.clone();
        let details = self.provider.invoice_details(id)?;
        if !details.is_fully_paid() {
            return Err(PoolError::NotPaid(id));
        }
        self.state.routes().get(id)?;

        let snapshot = position.fee_snapshot(details.paid_amount);
        let fees = calculate_fees(
            &position.fee_terms,
            &snapshot,
            position.elapsed_since_funding(now),
        )?;

        let received = (details.paid_amount - position.initial_paid).max(0);
        let principal = position.net_funded + position.protocol_fee;
        let recovered_principal = received.min(principal);
        let recovered = position.is_impaired();

        if recovered {
            self.state.capital.recoveries += recovered_principal;
        } else {
            self.release_position(&position, now)?;
            self.state.capital.realized_losses += principal - recovered_principal;
        }
        self.state.capital.realized_interest += fees.interest;
        self.state.fees.spread_gains += fees.spread;
        self.state.fees.admin_fees += fees.admin_fee;
        self.state.asset_balance += received - fees.kickback;
        self.state.routes.set_callback(id, false)?;
        self.state.remove_position(id);

        self.event_log.log(Event::InvoiceReconciled {
            timestamp: now,
            invoice_id: id,
            interest: fees.interest,
            spread: fees.spread,
            admin_fee: fees.admin_fee,
            kickback: fees.kickback,
            recovered,
        });
        if fees.kickback > 0 {
            self.event_log.log(Event::KickbackPaid {
                timestamp: now,
                invoice_id: id,
                receiver: position.creditor.clone(),
                amount: fees.kickback,
            });
        }
        info!(
            "invoice {} reconciled: interest {}, spread {}, admin {}, kickback {}",
            id, fees.interest, fees.spread, fees.admin_fee, fees.kickback
        );
        Ok(fees)
    }

    /// Close a funded position early at the creditor's request
    ///
    /// The creditor owes the net advance, the protocol fee and the fees
    /// accrued so far, less whatever the debtor already paid the pool.
    pub fn unfactor(&mut self, caller: &str, id: InvoiceId) -> Result<UnfactorOutcome, PoolError> {
        let now = self.now();
        let position = self.funded_position(id)?.clone();
        if caller != position.creditor && caller != self.config.owner {
            return Err(PoolError::Unauthorized {
                caller: caller.to_string(),
                action: "unfactor this invoice",
            });
        }
        let details = self.provider.invoice_details(id)?;
        self.state.routes().get(id)?;

        let snapshot = position.fee_snapshot(details.face_value);
        let fees = calculate_fees(
            &position.fee_terms,
            &snapshot,
            position.elapsed_since_funding(now),
        )?;
        let owed = position.net_funded + position.protocol_fee + fees.total_fees();
        let payments = (details.paid_amount - position.initial_paid).max(0);
        let settlement = owed - payments;

        self.release_position(&position, now)?;
        self.state.capital.realized_interest += fees.interest;
        self.state.fees.spread_gains += fees.spread;
        self.state.fees.admin_fees += fees.admin_fee;
        self.state.asset_balance += owed;
        self.state.routes.set_callback(id, false)?;
        self.state.remove_position(id);

        self.event_log.log(Event::InvoiceUnfactored {
            timestamp: now,
            invoice_id: id,
            caller: caller.to_string(),
            interest: fees.interest,
            spread: fees.spread,
            admin_fee: fees.admin_fee,
            settlement,
        });
        info!("invoice {} unfactored: owed {}, settlement {}", id, owed, settlement);

        Ok(UnfactorOutcome {
            interest: fees.interest,
            spread: fees.spread,
            admin_fee: fees.admin_fee,
            owed,
            payments,
            settlement,
        })
    }

    /// Write down a funded position past its impairment date
    ///
    /// Books `net_funded + protocol_fee` as a realized loss and takes the
    /// position out of the aggregates. A later payment is still settled by
    /// [`FactoringPool::reconcile`] as a recovery.
    pub fn impair(&mut self, caller: &str, id: InvoiceId) -> Result<i64, PoolError> {
        let now = self.now();
        if caller != self.config.underwriter && caller != self.config.owner {
            return Err(PoolError::Unauthorized {
                caller: caller.to_string(),
                action: "impair invoices",
            });
        }
        let position = self.funded_position(id)?.clone();
        if now < position.impairment_date {
            return Err(PoolError::NotYetImpaired {
                id,
                impairment_date: position.impairment_date,
            });
        }
        if self.provider.invoice_details(id)?.is_fully_paid() {
            return Err(PoolError::AlreadyPaid(id));
        }

        let loss = position.net_funded + position.protocol_fee;
        self.release_position(&position, now)?;
        self.state.capital.realized_losses += loss;
        if let Some(p) = self.state.position_mut(id) {
            p.status = PositionStatus::Impaired;
        }

        self.event_log.log(Event::InvoiceImpaired {
            timestamp: now,
            invoice_id: id,
            loss,
        });
        info!("invoice {} impaired: loss {}", id, loss);
        Ok(loss)
    }

    /// Fees the waterfall would produce if the invoice paid in full now
    pub fn preview_fees(&self, id: InvoiceId) -> Result<FeeBreakdown, PoolError> {
        let position = self.outstanding_position(id)?;
        let details = self.provider.invoice_details(id)?;
        let snapshot = position.fee_snapshot(details.face_value.max(details.paid_amount));
        Ok(calculate_fees(
            &position.fee_terms,
            &snapshot,
            position.elapsed_since_funding(self.now()),
        )?)
    }

    // ========================================================================
    // Keeper sweep
    // ========================================================================

    /// Funded or impaired positions whose invoice reports paid
    pub fn paid_positions(&self) -> Result<Vec<InvoiceId>, PoolError> {
        let mut paid = Vec::new();
        for position in self.state.positions().values() {
            if position.status == PositionStatus::Approved {
                continue;
            }
            if self
                .provider
                .invoice_details(position.invoice_id)?
                .is_fully_paid()
            {
                paid.push(position.invoice_id);
            }
        }
        Ok(paid)
    }

    /// Funded, unpaid positions past their impairment date
    pub fn impaired_candidates(&self) -> Result<Vec<InvoiceId>, PoolError> {
        let now = self.now();
        let mut candidates = Vec::new();
        for position in self.state.active_positions() {
            if now < position.impairment_date {
                continue;
            }
            if !self
                .provider
                .invoice_details(position.invoice_id)?
                .is_fully_paid()
            {
                candidates.push(position.invoice_id);
            }
        }
        Ok(candidates)
    }

    /// Reconcile every position whose invoice reports paid
    ///
    /// Returns `Err` only if the paid set cannot be read, before anything is
    /// reconciled. Per-invoice failures are collected in [`SweepResult::failed`].
    pub fn reconcile_paid_positions(&mut self) -> Result<SweepResult, PoolError> {
        let mut result = SweepResult::default();
        for id in self.paid_positions()? {
            match self.reconcile(id) {
                Ok(fees) => result.settled.push((id, fees)),
                Err(e) => {
                    warn!("keeper sweep could not reconcile invoice {}: {}", id, e);
                    result.failed.push((id, e));
                }
            }
        }
        debug!(
            "keeper sweep reconciled {} positions, {} failed",
            result.settled.len(),
            result.failed.len()
        );
        Ok(result)
    }

    // ========================================================================
    // Deposits and redemptions
    // ========================================================================

    fn check_depositor(&self, identity: &str) -> Result<(), PoolError> {
        if !self.deposit_permissions.is_allowed(identity) {
            return Err(PoolError::NotPermitted {
                identity: identity.to_string(),
            });
        }
        Ok(())
    }

    /// Deposit assets and mint shares to `receiver`
    pub fn deposit(&mut self, caller: &str, receiver: &str, assets: i64) -> Result<i64, PoolError> {
        let now = self.now();
        self.check_depositor(caller)?;
        self.check_depositor(receiver)?;
        Self::check_amount("deposit", assets)?;

        // Fully written-down pool: outstanding shares have no price
        let supply = self.state.shares().total_supply();
        if supply > 0 && self.total_assets() == 0 {
            return Err(PoolError::UnbackedShares { supply });
        }
        let shares = self.convert_to_shares(assets);
        Self::check_amount("deposit shares", shares)?;

        self.state.shares.mint(receiver, shares)?;
        self.state.capital.deposits += assets;
        self.state.asset_balance += assets;

        self.event_log.log(Event::Deposit {
            timestamp: now,
            depositor: caller.to_string(),
            receiver: receiver.to_string(),
            assets,
            shares,
        });
        debug!("{} deposited {} for {} shares", caller, assets, shares);
        Ok(shares)
    }

    /// Redeem `shares`; whatever cannot be paid now is queued
    pub fn redeem(
        &mut self,
        caller: &str,
        receiver: &str,
        shares: i64,
    ) -> Result<RedemptionOutcome, PoolError> {
        self.check_depositor(caller)?;
        let now = self.now();
        Ok(settlement::submit_redemption(
            &mut self.state,
            caller,
            receiver,
            RedemptionRequest::Shares(shares),
            now,
            &mut self.event_log,
        )?)
    }

    /// Withdraw `assets`; whatever cannot be paid now is queued
    pub fn withdraw(
        &mut self,
        caller: &str,
        receiver: &str,
        assets: i64,
    ) -> Result<RedemptionOutcome, PoolError> {
        self.check_depositor(caller)?;
        let now = self.now();
        Ok(settlement::submit_redemption(
            &mut self.state,
            caller,
            receiver,
            RedemptionRequest::Assets(assets),
            now,
            &mut self.event_log,
        )?)
    }

    /// Serve queued redemptions from available liquidity (callable by anyone)
    pub fn process_queue(&mut self) -> Result<QueueProcessingResult, PoolError> {
        let now = self.now();
        Ok(settlement::process_queue(
            &mut self.state,
            now,
            &mut self.event_log,
        )?)
    }

    /// Cancel the caller's queue entry at `index`
    pub fn cancel_redemption(
        &mut self,
        caller: &str,
        index: usize,
    ) -> Result<RedemptionRequest, PoolError> {
        let cancelled = self.state.queue.cancel(index, Canceller::Account(caller))?;
        self.event_log.log(Event::RedemptionCancelled {
            timestamp: self.clock.now(),
            owner: caller.to_string(),
            index,
            request: cancelled.request(),
        });
        Ok(cancelled.request())
    }

    /// Reclaim the dead prefix of the queue (owner only)
    ///
    /// Indices returned by earlier calls are invalidated.
    pub fn compact_queue(&mut self, caller: &str) -> Result<usize, PoolError> {
        self.require_owner(caller, "compact the redemption queue")?;
        let reclaimed = self.state.queue.compact();
        self.event_log.log(Event::QueueCompacted {
            timestamp: self.clock.now(),
            reclaimed,
        });
        debug!("queue compacted, {} entries reclaimed", reclaimed);
        Ok(reclaimed)
    }

    /// Live queue entries in service order
    pub fn queue_entries(&self) -> impl Iterator<Item = (usize, &QueueEntry)> {
        self.state.queue().live_entries()
    }

    /// Total queued (shares, assets)
    pub fn queued_redemptions(&self) -> (i64, i64) {
        self.state.queue().totals()
    }

    // ========================================================================
    // Previews
    // ========================================================================

    pub fn available_liquidity(&self) -> i64 {
        self.state.available_liquidity()
    }

    pub fn total_assets(&self) -> i64 {
        self.state.total_assets(self.now())
    }

    pub fn accrued_interest(&self) -> i64 {
        self.state.accrued_interest(self.now())
    }

    pub fn convert_to_shares(&self, assets: i64) -> i64 {
        self.state
            .shares()
            .convert_to_shares(assets, self.total_assets(), Rounding::Down)
    }

    pub fn convert_to_assets(&self, shares: i64) -> i64 {
        self.state
            .shares()
            .convert_to_assets(shares, self.total_assets(), Rounding::Down)
    }

    /// Shares `owner` may redeem
    pub fn max_redeem(&self, owner: &str) -> i64 {
        settlement::max_redeemable(&self.state, owner, self.now()).0
    }

    /// Assets `owner` may withdraw
    pub fn max_withdraw(&self, owner: &str) -> i64 {
        settlement::max_redeemable(&self.state, owner, self.now()).1
    }

    // ========================================================================
    // Fee withdrawals
    // ========================================================================

    /// Pay out admin fees and spread gains to the owner
    pub fn withdraw_admin_fees(&mut self, caller: &str) -> Result<i64, PoolError> {
        self.require_owner(caller, "withdraw admin fees")?;
        let admin_fees = self.state.fees.admin_fees;
        let spread_gains = self.state.fees.spread_gains;
        self.state.fees.admin_fees = 0;
        self.state.fees.spread_gains = 0;
        self.state.asset_balance -= admin_fees + spread_gains;

        self.event_log.log(Event::FeesWithdrawn {
            timestamp: self.clock.now(),
            recipient: caller.to_string(),
            admin_fees,
            spread_gains,
            protocol_fees: 0,
        });
        Ok(admin_fees + spread_gains)
    }

    /// Pay out protocol fees to the protocol fee receiver
    pub fn withdraw_protocol_fees(&mut self, caller: &str) -> Result<i64, PoolError> {
        self.require(
            caller,
            &self.config.protocol_fee_receiver,
            "withdraw protocol fees",
        )?;
        let protocol_fees = self.state.fees.protocol_fees;
        self.state.fees.protocol_fees = 0;
        self.state.asset_balance -= protocol_fees;

        self.event_log.log(Event::FeesWithdrawn {
            timestamp: self.clock.now(),
            recipient: caller.to_string(),
            admin_fees: 0,
            spread_gains: 0,
            protocol_fees,
        });
        Ok(protocol_fees)
    }

    // ========================================================================
    // Parameters (owner only)
    // ========================================================================

    fn log_parameter(&mut self, name: &str, old_value: String, new_value: String) {
        info!("parameter {} changed: {} -> {}", name, old_value, new_value);
        self.event_log.log(Event::ParameterChanged {
            timestamp: self.clock.now(),
            name: name.to_string(),
            old_value,
            new_value,
        });
    }

    pub fn set_admin_fee_bps(&mut self, caller: &str, bps: u32) -> Result<(), PoolError> {
        self.require_owner(caller, "set the admin fee")?;
        Self::check_bps("admin_fee_bps", bps)?;
        let old = std::mem::replace(&mut self.config.admin_fee_bps, bps);
        self.log_parameter("admin_fee_bps", old.to_string(), bps.to_string());
        Ok(())
    }

    pub fn set_protocol_fee_bps(&mut self, caller: &str, bps: u32) -> Result<(), PoolError> {
        self.require_owner(caller, "set the protocol fee")?;
        Self::check_bps("protocol_fee_bps", bps)?;
        let old = std::mem::replace(&mut self.config.protocol_fee_bps, bps);
        self.log_parameter("protocol_fee_bps", old.to_string(), bps.to_string());
        Ok(())
    }

    pub fn set_underwriter(&mut self, caller: &str, underwriter: &str) -> Result<(), PoolError> {
        self.require_owner(caller, "set the underwriter")?;
        if underwriter.is_empty() {
            return Err(crate::pool::config::ConfigError::EmptyField("underwriter").into());
        }
        let old = std::mem::replace(&mut self.config.underwriter, underwriter.to_string());
        self.log_parameter("underwriter", old, underwriter.to_string());
        Ok(())
    }

    pub fn set_approval_duration(&mut self, caller: &str, seconds: u64) -> Result<(), PoolError> {
        self.require_owner(caller, "set the approval duration")?;
        if seconds == 0 {
            return Err(crate::pool::config::ConfigError::ZeroApprovalDuration.into());
        }
        let old = std::mem::replace(&mut self.config.approval_duration_secs, seconds);
        self.log_parameter("approval_duration_secs", old.to_string(), seconds.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{AllowAll, InMemoryInvoiceProvider};

    const START: u64 = 1_700_006_400;
    const DAY: u64 = 86_400;

    fn pool() -> FactoringPool<InMemoryInvoiceProvider, AllowAll> {
        let config = PoolConfig::new("USDC", "owner", "underwriter", "treasury")
            .with_admin_fee_bps(50)
            .with_protocol_fee_bps(25);
        let mut provider = InMemoryInvoiceProvider::new("0xinvoices");
        provider.insert(
            1,
            InvoiceDetails::new(10_000, START + 30 * DAY, "acme", "buyer", "USDC"),
        );
        FactoringPool::new(config, START, provider, AllowAll, AllowAll).unwrap()
    }

    #[test]
    fn test_only_underwriter_approves() {
        let mut pool = pool();
        let err = pool.approve("mallory", 1, 500, 200, 8_000, 0).unwrap_err();
        assert!(matches!(err, PoolError::Unauthorized { .. }));
        assert!(pool.position(1).is_none());
        assert!(pool.event_log().is_empty());
    }

    #[test]
    fn test_reapproval_replaces_unfunded_approval() {
        let mut pool = pool();
        pool.approve("underwriter", 1, 500, 200, 8_000, 0).unwrap();
        pool.approve("underwriter", 1, 600, 100, 7_000, 0).unwrap();
        let position = pool.position(1).unwrap();
        assert_eq!(position.fee_terms.target_yield_bps, 600);
        assert_eq!(position.fee_terms.upfront_bps, 7_000);
        assert_eq!(pool.provider().initialize_calls(1), 1);
    }

    #[test]
    fn test_fund_without_liquidity_leaves_state_untouched() {
        let mut pool = pool();
        pool.approve("underwriter", 1, 500, 200, 8_000, 0).unwrap();
        let before = pool.state().clone();
        let err = pool.fund("acme", 1, 8_000, "acme").unwrap_err();
        assert!(matches!(err, PoolError::InsufficientLiquidity { .. }));
        assert_eq!(pool.state(), &before);
    }

    #[test]
    fn test_fee_withdrawals_keep_cash_identity() {
        let mut pool = pool();
        pool.deposit("alice", "alice", 50_000).unwrap();
        pool.approve("underwriter", 1, 500, 200, 8_000, 0).unwrap();
        pool.fund("acme", 1, 8_000, "acme").unwrap();
        pool.advance_days(10);
        pool.provider_mut().pay_in_full(1).unwrap();
        pool.reconcile(1).unwrap();

        assert_eq!(pool.withdraw_protocol_fees("treasury").unwrap(), 25);
        assert!(pool.withdraw_admin_fees("owner").unwrap() > 0);
        assert_eq!(pool.state().fee_balances().total(), 0);
        assert!(pool.state().check_invariants().is_ok());
        assert!(pool.withdraw_protocol_fees("owner").is_err());
    }

    #[test]
    fn test_parameter_changes_are_logged() {
        let mut pool = pool();
        pool.set_admin_fee_bps("owner", 75).unwrap();
        assert_eq!(pool.config().admin_fee_bps, 75);
        assert!(pool.set_admin_fee_bps("owner", 10_001).is_err());
        assert!(pool.set_underwriter("alice", "alice").is_err());
        assert_eq!(pool.event_log().events_of_type("ParameterChanged").len(), 1);
    }
}
