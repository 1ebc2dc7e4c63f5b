//! Redemption Service
//!
//! Pays depositors out of free liquidity and keeps everyone who could not be
//! paid in the FIFO redemption queue.
//!
//! # Flow
//!
//! ```text
//! redeem / withdraw
//!   ├─ void the owner's previous queue entry (if any)
//!   ├─ process_queue (older requests first)
//!   ├─ queue still non-empty?  → enqueue the whole request behind it
//!   └─ otherwise serve up to available liquidity, enqueue the remainder
//! ```
//!
//! # Critical Invariants
//!
//! - **FIFO**: a later request is never served while an earlier live one waits
//! - **Halting**: a pass stops (without error) the first time liquidity
//!   cannot serve the head; it never skips ahead
//! - **No dust heads**: a head whose remaining request is worth zero assets is
//!   cancelled by the engine instead of blocking the queue
//! - **Bounded**: a pass runs at most `live_len` iterations
//! - **Atomicity**: each served amount burns shares, reduces the capital
//!   account and pays out in one step

use log::debug;
use thiserror::Error;

use crate::models::event::{Event, EventLog};
use crate::models::redemption_queue::{Canceller, QueueError, RedemptionRequest};
use crate::models::shares::{Rounding, ShareError};
use crate::models::state::PoolState;

/// Errors that can occur while submitting or serving redemptions
#[derive(Debug, Error, PartialEq)]
pub enum RedemptionError {
    #[error("Redemption amount must be positive, got {0}")]
    InvalidAmount(i64),

    #[error("Redeeming {0} shares pays out nothing at the current share price")]
    WorthNothing(i64),

    #[error("{owner} cannot redeem {requested}: maximum is {maximum}")]
    ExceedsMaximum {
        owner: String,
        requested: i64,
        maximum: i64,
    },

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Share error: {0}")]
    Shares(#[from] ShareError),
}

/// Outcome of a redeem/withdraw request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedemptionOutcome {
    /// Assets paid out immediately
    pub assets_paid: i64,
    /// Shares burned immediately
    pub shares_burned: i64,
    /// Index and remaining amount of the queued remainder, if any
    pub queued: Option<(usize, RedemptionRequest)>,
}

/// Statistics from one queue pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueProcessingResult {
    /// Entries fully served this pass
    pub completed_count: usize,
    /// Total assets paid out
    pub assets_paid: i64,
    /// Total shares burned
    pub shares_burned: i64,
    /// Entries cancelled because their owner holds no shares or their
    /// remainder is worth nothing
    pub cancelled_count: usize,
    /// Live entries left
    pub remaining_live: usize,
    /// Pass stopped because the head could not be served
    pub halted: bool,
}

/// Amount of one service step: (shares to burn, assets to pay, entry finished)
type ServiceStep = (i64, i64, bool);

/// Work out how much of `request` can be served now
///
/// Returns `None` if nothing can be served (no liquidity or dust).
/// `finished` is true when this step closes the request, either because it
/// is paid in full or because the owner's holdings are exhausted.
fn plan_service(
    state: &PoolState,
    owner: &str,
    request: RedemptionRequest,
    now: u64,
) -> Option<ServiceStep> {
    let liquidity = state.available_liquidity();
    if liquidity <= 0 {
        return None;
    }
    let total_assets = state.total_assets(now);
    let held = state.shares.balance_of(owner);

    match request {
        RedemptionRequest::Shares(queued) => {
            let wanted = queued.min(held);
            let by_liquidity =
                state
                    .shares
                    .convert_to_shares(liquidity, total_assets, Rounding::Down);
            let shares = wanted.min(by_liquidity);
            let assets = state
                .shares
                .convert_to_assets(shares, total_assets, Rounding::Down);
            if shares <= 0 || assets <= 0 {
                return None;
            }
            Some((shares, assets, shares == wanted))
        }
        RedemptionRequest::Assets(queued) => {
            let held_assets = state
                .shares
                .convert_to_assets(held, total_assets, Rounding::Down);
            let wanted = queued.min(held_assets);
            let assets = wanted.min(liquidity);
            let shares = state
                .shares
                .convert_to_shares(assets, total_assets, Rounding::Up)
                .min(held);
            if shares <= 0 || assets <= 0 {
                return None;
            }
            Some((shares, assets, assets == wanted))
        }
    }
}

/// Burn shares and pay assets out of the capital account
fn pay_out(state: &mut PoolState, owner: &str, shares: i64, assets: i64) -> Result<(), ShareError> {
    state.shares.burn(owner, shares)?;
    state.capital.redemptions += assets;
    state.asset_balance -= assets;
    Ok(())
}

/// Assets the rest of `request` is worth, capped by the owner's holdings
fn remainder_value(state: &PoolState, owner: &str, request: RedemptionRequest, now: u64) -> i64 {
    let (held, held_assets) = max_redeemable(state, owner, now);
    match request {
        RedemptionRequest::Shares(queued) => {
            state
                .shares
                .convert_to_assets(queued.min(held), state.total_assets(now), Rounding::Down)
        }
        RedemptionRequest::Assets(queued) => queued.min(held_assets),
    }
}

/// Drop the head entry on the engine's behalf
fn cancel_head(
    state: &mut PoolState,
    index: usize,
    owner: String,
    request: RedemptionRequest,
    now: u64,
    log: &mut EventLog,
) -> Result<(), RedemptionError> {
    state.queue.cancel(index, Canceller::Engine)?;
    log.log(Event::RedemptionCancelled {
        timestamp: now,
        owner,
        index,
        request,
    });
    Ok(())
}

/// Largest request `owner` may submit (shares, assets)
pub fn max_redeemable(state: &PoolState, owner: &str, now: u64) -> (i64, i64) {
    let held = state.shares.balance_of(owner);
    let assets = state
        .shares
        .convert_to_assets(held, state.total_assets(now), Rounding::Down);
    (held, assets)
}

/// Serve queued requests from the head while liquidity lasts
///
/// # Example
///
/// ```rust
/// use factoring_pool_core_rs::models::event::EventLog;
/// use factoring_pool_core_rs::models::state::PoolState;
/// use factoring_pool_core_rs::settlement::process_queue;
///
/// let mut state = PoolState::new(0, 100);
/// let mut log = EventLog::new();
/// let result = process_queue(&mut state, 0, &mut log).unwrap();
/// assert_eq!(result.completed_count, 0);
/// assert!(!result.halted);
/// ```
pub fn process_queue(
    state: &mut PoolState,
    now: u64,
    log: &mut EventLog,
) -> Result<QueueProcessingResult, RedemptionError> {
    let mut result = QueueProcessingResult::default();
    let max_iterations = state.queue.live_len();

    for _ in 0..max_iterations {
        let Some((index, entry)) = state.queue.head() else {
            break;
        };
        let owner = entry.owner().unwrap_or_default().to_string();
        let receiver = entry.receiver().to_string();
        let request = entry.request();

        if state.shares.balance_of(&owner) == 0 {
            cancel_head(state, index, owner, request, now, log)?;
            result.cancelled_count += 1;
            continue;
        }

        let Some((shares, assets, finished)) = plan_service(state, &owner, request, now) else {
            if state.available_liquidity() > 0 && remainder_value(state, &owner, request, now) == 0 {
                debug!("cancelling worthless queue entry {} of {}", index, owner);
                cancel_head(state, index, owner, request, now, log)?;
                result.cancelled_count += 1;
                continue;
            }
            result.halted = true;
            break;
        };

        pay_out(state, &owner, shares, assets)?;
        let consumed = if finished {
            request.amount()
        } else if request.is_shares() {
            shares
        } else {
            assets
        };
        state.queue.consume_from_head(consumed)?;

        log.log(Event::RedemptionServed {
            timestamp: now,
            owner,
            receiver,
            assets,
            shares,
            queue_index: Some(index),
        });
        result.assets_paid += assets;
        result.shares_burned += shares;

        if finished {
            result.completed_count += 1;
        } else {
            // Partially served: liquidity is exhausted
            result.halted = true;
            break;
        }
    }

    result.remaining_live = state.queue.live_len();
    debug!(
        "queue pass at {}: completed {}, paid {}, remaining {}",
        now, result.completed_count, result.assets_paid, result.remaining_live
    );
    Ok(result)
}

/// Submit a redemption (shares) or withdrawal (assets) request
///
/// Validation happens before any state change; a rejected request leaves
/// state and queue untouched.
pub fn submit_redemption(
    state: &mut PoolState,
    owner: &str,
    receiver: &str,
    request: RedemptionRequest,
    now: u64,
    log: &mut EventLog,
) -> Result<RedemptionOutcome, RedemptionError> {
    if request.amount() <= 0 {
        return Err(RedemptionError::InvalidAmount(request.amount()));
    }
    let (max_shares, max_assets) = max_redeemable(state, owner, now);
    let maximum = if request.is_shares() {
        max_shares
    } else {
        max_assets
    };
    if request.amount() > maximum {
        return Err(RedemptionError::ExceedsMaximum {
            owner: owner.to_string(),
            requested: request.amount(),
            maximum,
        });
    }
    if remainder_value(state, owner, request, now) == 0 {
        return Err(RedemptionError::WorthNothing(request.amount()));
    }

    // Conservative capacity check: processing can only shrink the queue
    let previous = state.queue.index_of_owner(owner);
    let live_without_owner = state.queue.live_len() - usize::from(previous.is_some());
    let max_length = state.queue.max_length();
    let may_queue = live_without_owner > 0 || request_exceeds_liquidity(state, request, now);
    if may_queue && live_without_owner >= max_length {
        return Err(QueueError::QueueFull { max_length }.into());
    }

    if let Some(index) = previous {
        let voided = state.queue.cancel(index, Canceller::Engine)?;
        log.log(Event::RedemptionCancelled {
            timestamp: now,
            owner: owner.to_string(),
            index,
            request: voided.request(),
        });
    }

    if !state.queue.is_empty() {
        process_queue(state, now, log)?;
    }

    let mut outcome = RedemptionOutcome {
        assets_paid: 0,
        shares_burned: 0,
        queued: None,
    };

    let mut remaining = request;
    if state.queue.is_empty() {
        if let Some((shares, assets, finished)) = plan_service(state, owner, request, now) {
            pay_out(state, owner, shares, assets)?;
            log.log(Event::RedemptionServed {
                timestamp: now,
                owner: owner.to_string(),
                receiver: receiver.to_string(),
                assets,
                shares,
                queue_index: None,
            });
            outcome.assets_paid = assets;
            outcome.shares_burned = shares;
            let served = if request.is_shares() { shares } else { assets };
            remaining = request.with_amount(if finished {
                0
            } else {
                request.amount() - served
            });
        }
    }

    if remaining.amount() > 0 {
        let index = state.queue.enqueue(owner, receiver, remaining, now)?;
        log.log(Event::RedemptionQueued {
            timestamp: now,
            owner: owner.to_string(),
            receiver: receiver.to_string(),
            index,
            request: remaining,
        });
        outcome.queued = Some((index, remaining));
    }

    Ok(outcome)
}

fn request_exceeds_liquidity(state: &PoolState, request: RedemptionRequest, now: u64) -> bool {
    let assets = match request {
        RedemptionRequest::Assets(v) => v,
        RedemptionRequest::Shares(v) => {
            state
                .shares
                .convert_to_assets(v, state.total_assets(now), Rounding::Down)
        }
    };
    assets > state.available_liquidity()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn funded_state(depositors: &[(&str, i64)]) -> PoolState {
        let mut state = PoolState::new(0, 10);
        for (owner, assets) in depositors {
            state.shares.mint(owner, *assets).unwrap();
            state.capital.deposits += assets;
            state.asset_balance += assets;
        }
        state
    }

    #[test]
    fn test_immediate_full_service() {
        let mut state = funded_state(&[("alice", 1_000)]);
        let mut log = EventLog::new();
        let outcome = submit_redemption(
            &mut state,
            "alice",
            "alice",
            RedemptionRequest::Assets(400),
            0,
            &mut log,
        )
        .unwrap();
        assert_eq!(outcome.assets_paid, 400);
        assert_eq!(outcome.queued, None);
        assert_eq!(state.shares.balance_of("alice"), 600);
        assert!(state.check_invariants().is_ok());
    }

    #[test]
    fn test_shortfall_queues_remainder() {
        let mut state = funded_state(&[("alice", 1_000)]);
        // Reserve 700 of liquidity as if funded into a position
        state.ledger.on_fund(700, 0, 700, 1_000).unwrap();
        let mut log = EventLog::new();

        let outcome = submit_redemption(
            &mut state,
            "alice",
            "alice",
            RedemptionRequest::Shares(500),
            0,
            &mut log,
        )
        .unwrap();
        assert_eq!(outcome.shares_burned, 300);
        assert_eq!(outcome.queued, Some((0, RedemptionRequest::Shares(200))));
    }

    #[test]
    fn test_owner_without_shares_is_cancelled_during_pass() {
        let mut state = funded_state(&[("alice", 100), ("bob", 100)]);
        state.queue.enqueue("carol", "carol", RedemptionRequest::Assets(10), 0).unwrap();
        state.queue.enqueue("bob", "bob", RedemptionRequest::Assets(50), 0).unwrap();
        let mut log = EventLog::new();

        let result = process_queue(&mut state, 0, &mut log).unwrap();
        assert_eq!(result.cancelled_count, 1);
        assert_eq!(result.completed_count, 1);
        assert_eq!(result.assets_paid, 50);
        assert!(state.queue.is_empty());
    }

    #[test]
    fn test_worthless_head_is_cancelled_not_halted() {
        let mut state = funded_state(&[("alice", 100), ("bob", 100)]);
        // Half the capital lost: one share is worth half an asset
        state.capital.realized_losses += 100;
        state.asset_balance -= 100;
        state.queue.enqueue("alice", "alice", RedemptionRequest::Shares(1), 0).unwrap();
        state.queue.enqueue("bob", "bob", RedemptionRequest::Assets(30), 0).unwrap();
        let mut log = EventLog::new();

        let result = process_queue(&mut state, 0, &mut log).unwrap();
        assert!(!result.halted);
        assert_eq!(result.cancelled_count, 1);
        assert_eq!(result.completed_count, 1);
        assert_eq!(result.assets_paid, 30);
        assert_eq!(state.shares.balance_of("alice"), 100);
        assert_eq!(state.shares.balance_of("bob"), 40);
        assert!(state.queue.is_empty());
        assert_eq!(log.events_of_type("RedemptionCancelled").len(), 1);
    }

    #[test]
    fn test_worthless_request_rejected() {
        let mut state = funded_state(&[("alice", 100), ("bob", 100)]);
        state.capital.realized_losses += 100;
        state.asset_balance -= 100;
        let before = state.clone();
        let mut log = EventLog::new();
        let err = submit_redemption(
            &mut state,
            "alice",
            "alice",
            RedemptionRequest::Shares(1),
            0,
            &mut log,
        )
        .unwrap_err();
        assert_eq!(err, RedemptionError::WorthNothing(1));
        assert_eq!(state, before);
    }

    #[test]
    fn test_exceeding_holdings_rejected_without_mutation() {
        let mut state = funded_state(&[("alice", 100)]);
        let before = state.clone();
        let mut log = EventLog::new();
        let err = submit_redemption(
            &mut state,
            "alice",
            "alice",
            RedemptionRequest::Shares(101),
            0,
            &mut log,
        )
        .unwrap_err();
        assert!(matches!(err, RedemptionError::ExceedsMaximum { .. }));
        assert_eq!(state, before);
        assert!(log.is_empty());
    }
}
