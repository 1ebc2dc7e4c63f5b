//! Pool Lifecycle Tests
//!
//! End-to-end approve → fund → reconcile / unfactor / impair flows through
//! the `FactoringPool` facade, including every rejection path and the
//! ledger identities after each step.

use std::cell::Cell;

use factoring_pool_core_rs::models::accrual::daily_rate;
use factoring_pool_core_rs::pool::{ErrorKind, FactoringPool, PoolConfig, PoolError};
use factoring_pool_core_rs::providers::{
    AllowList, InMemoryInvoiceProvider, InvoiceDetails, InvoiceId, InvoiceProvider,
    ProviderError,
};
use factoring_pool_core_rs::{Event, FeeError, PositionStatus};

const START: u64 = 1_700_006_400;
const DAY: u64 = 86_400;

type Pool = FactoringPool<InMemoryInvoiceProvider, AllowList>;

fn invoice(face_value: i64) -> InvoiceDetails {
    InvoiceDetails::new(face_value, START + 30 * DAY, "acme", "buyer", "USDC")
        .with_grace_period(5 * DAY)
}

fn pool_with_deposit(deposit: i64) -> Pool {
    let config = PoolConfig::new("USDC", "owner", "underwriter", "treasury")
        .with_admin_fee_bps(50)
        .with_protocol_fee_bps(25);

    let mut provider = InMemoryInvoiceProvider::new("0xinvoices");
    provider.insert(1, invoice(10_000));
    provider.insert(2, invoice(20_000));

    let depositors = AllowList::new(["alice", "bob", "carol"]);
    let factors = AllowList::new(["acme", "newco"]);
    let mut pool = FactoringPool::new(config, START, provider, depositors, factors).unwrap();
    if deposit > 0 {
        pool.deposit("alice", "alice", deposit).unwrap();
    }
    pool
}

/// Pool with invoice 1 approved on the reference terms
fn approved_pool(deposit: i64) -> Pool {
    let mut pool = pool_with_deposit(deposit);
    pool.approve("underwriter", 1, 500, 200, 8_000, 0).unwrap();
    pool
}

/// Pool with invoice 1 funded at the full approved advance
fn funded_pool() -> Pool {
    let mut pool = approved_pool(100_000);
    pool.fund("acme", 1, 8_000, "acme").unwrap();
    pool
}

fn assert_consistent(pool: &Pool) {
    if let Err(e) = pool.state().check_invariants() {
        panic!("invariants broken: {}", e);
    }
}

// ============================================================================
// Scenario A: approve and fund
// ============================================================================

#[test]
fn test_scenario_a_funding() {
    let mut pool = approved_pool(100_000);
    let preview = pool.preview_funding(1, 8_000).unwrap();
    let quote = pool.fund("acme", 1, 8_000, "acme").unwrap();

    assert_eq!(quote, preview);
    assert_eq!(quote.gross, 8_000);
    assert_eq!(quote.protocol_fee, 25);
    assert_eq!(quote.net, 7_939);

    let state = pool.state();
    assert_eq!(state.ledger().capital_at_risk(), 8_025);
    assert_eq!(state.ledger().withheld_fees(), 86);
    assert_eq!(state.tracker().total_daily_rate(), daily_rate(10_000, 500));
    assert_eq!(state.available_liquidity(), 100_000 - 8_025);
    assert_eq!(state.asset_balance(), 100_000 - 7_939);
    assert_eq!(state.fee_balances().protocol_fees, 25);

    let position = pool.position(1).unwrap();
    assert_eq!(position.status, PositionStatus::Funded);
    assert_eq!(position.funded_at, Some(START));
    assert_eq!(position.receiver.as_deref(), Some("acme"));
    assert!(state.routes().get(1).unwrap().callback_registered);
    assert_consistent(&pool);
}

#[test]
fn test_partial_advance_updates_terms() {
    let mut pool = approved_pool(100_000);
    let quote = pool.fund("acme", 1, 5_000, "acme").unwrap();
    assert_eq!(quote.gross, 5_000);
    assert_eq!(pool.position(1).unwrap().fee_terms.upfront_bps, 5_000);
    assert_consistent(&pool);
}

#[test]
fn test_accrued_interest_matches_positions() {
    let mut pool = funded_pool();
    pool.advance_days(10);
    let now = pool.now();
    assert_eq!(pool.accrued_interest(), 13);
    assert_eq!(pool.accrued_interest(), pool.state().accrued_interest_slow(now));
    assert_eq!(pool.total_assets(), 100_013);
}

// ============================================================================
// Scenario B: settlement
// ============================================================================

#[test]
fn test_scenario_b_early_payment() {
    let mut early = funded_pool();
    early.advance_days(10);
    early.provider_mut().pay_in_full(1).unwrap();
    let early_fees = early.reconcile(1).unwrap();

    let mut on_time = funded_pool();
    on_time.advance_days(30);
    on_time.provider_mut().pay_in_full(1).unwrap();
    let on_time_fees = on_time.reconcile(1).unwrap();

    assert_eq!(early_fees.kickback, 2_016);
    assert_eq!(on_time_fees.kickback, 1_975);
    assert!(early_fees.kickback > on_time_fees.kickback);

    for pool in [&early, &on_time] {
        assert_eq!(pool.state().tracker().total_daily_rate(), 0);
        assert_eq!(pool.state().ledger().capital_at_risk(), 0);
        assert_eq!(pool.state().ledger().withheld_fees(), 0);
        assert!(pool.position(1).is_none());
        assert_consistent(pool);
    }
    assert_eq!(early.state().capital().realized_interest, 13);
    assert_eq!(early.state().fee_balances().spread_gains, 5);
    assert_eq!(early.state().fee_balances().admin_fees, 2);
}

#[test]
fn test_reconcile_happens_exactly_once() {
    let mut pool = funded_pool();
    pool.advance_days(10);
    pool.provider_mut().pay_in_full(1).unwrap();
    pool.reconcile(1).unwrap();

    let before = pool.state().clone();
    let err = pool.reconcile(1).unwrap_err();
    assert_eq!(err, PoolError::InvoiceNotApproved(1));
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(pool.state(), &before);
    assert!(!pool.state().routes().get(1).unwrap().callback_registered);
}

#[test]
fn test_reconcile_requires_payment() {
    let mut pool = funded_pool();
    pool.provider_mut().pay(1, 5_000).unwrap();
    let err = pool.reconcile(1).unwrap_err();
    assert_eq!(err, PoolError::NotPaid(1));
    assert_eq!(err.kind(), ErrorKind::Temporal);
}

#[test]
fn test_preview_matches_settlement() {
    let mut pool = funded_pool();
    pool.advance_days(12);
    let preview = pool.preview_fees(1).unwrap();
    pool.provider_mut().pay_in_full(1).unwrap();
    assert_eq!(pool.reconcile(1).unwrap(), preview);
}

#[test]
fn test_conservation_on_settlement() {
    let mut pool = funded_pool();
    pool.advance_days(20);
    pool.provider_mut().pay_in_full(1).unwrap();
    let fees = pool.reconcile(1).unwrap();
    assert_eq!(fees.total_fees() + fees.kickback + 25 + 7_939, 10_000);
}

#[test]
fn test_event_trail_for_invoice() {
    let mut pool = funded_pool();
    pool.advance_days(10);
    pool.provider_mut().pay_in_full(1).unwrap();
    pool.reconcile(1).unwrap();

    let types: Vec<&str> = pool
        .event_log()
        .events_for_invoice(1)
        .iter()
        .map(|e| e.event_type())
        .collect();
    assert_eq!(
        types,
        vec!["InvoiceApproved", "InvoiceFunded", "InvoiceReconciled", "KickbackPaid"]
    );
    assert!(matches!(
        pool.event_log().events_of_type("KickbackPaid")[0],
        Event::KickbackPaid { amount: 2_016, .. }
    ));
}

// ============================================================================
// Approval rejections
// ============================================================================

#[test]
fn test_approve_rejections() {
    let mut pool = pool_with_deposit(100_000);
    pool.provider_mut()
        .insert(3, InvoiceDetails::new(1_000, START + DAY, "acme", "buyer", "EURC"));
    pool.provider_mut()
        .insert(4, invoice(1_000).with_paid_amount(1_000));
    pool.provider_mut()
        .insert(5, InvoiceDetails::new(1_000, START, "acme", "buyer", "USDC"));

    let cases: Vec<(PoolError, ErrorKind)> = vec![
        (
            pool.approve("acme", 1, 500, 200, 8_000, 0).unwrap_err(),
            ErrorKind::Authorization,
        ),
        (
            pool.approve("underwriter", 3, 500, 200, 8_000, 0).unwrap_err(),
            ErrorKind::InvariantViolation,
        ),
        (
            pool.approve("underwriter", 4, 500, 200, 8_000, 0).unwrap_err(),
            ErrorKind::Temporal,
        ),
        (
            pool.approve("underwriter", 5, 500, 200, 8_000, 0).unwrap_err(),
            ErrorKind::Temporal,
        ),
        (
            pool.approve("underwriter", 1, 500, 200, 10_001, 0).unwrap_err(),
            ErrorKind::InvariantViolation,
        ),
        (
            pool.approve("underwriter", 99, 500, 200, 8_000, 0).unwrap_err(),
            ErrorKind::NotFound,
        ),
    ];
    for (err, kind) in cases {
        assert_eq!(err.kind(), kind, "{}", err);
    }
    assert!(pool.state().positions().is_empty());
    assert_eq!(pool.event_log().events_of_type("InvoiceApproved").len(), 0);
}

#[test]
fn test_approve_rejects_unfundable_terms() {
    let mut pool = pool_with_deposit(100_000);
    // 100% advance plus the 25 bps protocol fee exceeds face value
    let err = pool.approve("underwriter", 1, 500, 200, 10_000, 0).unwrap_err();
    assert!(matches!(
        err,
        PoolError::Fee(FeeError::AdvanceExceedsFaceValue { .. })
    ));
}

#[test]
fn test_approve_canceled_invoice() {
    let mut pool = pool_with_deposit(100_000);
    pool.provider_mut().cancel(1).unwrap();
    let err = pool.approve("underwriter", 1, 500, 200, 8_000, 0).unwrap_err();
    assert_eq!(err, PoolError::InvoiceCanceled(1));
}

#[test]
fn test_approve_with_face_value_override() {
    let mut pool = pool_with_deposit(100_000);
    pool.approve("underwriter", 2, 500, 200, 8_000, 12_000).unwrap();
    assert_eq!(pool.position(2).unwrap().initial_face_value, 12_000);

    pool.provider_mut().pay(1, 4_000).unwrap();
    pool.approve("underwriter", 1, 500, 200, 8_000, 0).unwrap();
    let position = pool.position(1).unwrap();
    assert_eq!(position.initial_face_value, 6_000);
    assert_eq!(position.initial_paid, 4_000);
}

#[test]
fn test_approve_initializes_routing_once() {
    let mut pool = approved_pool(100_000);
    pool.approve("underwriter", 1, 400, 100, 7_000, 0).unwrap();
    assert_eq!(pool.provider().initialize_calls(1), 1);
    assert_eq!(
        pool.state().routes().get(1).unwrap().contract_address,
        "0xinvoices"
    );
    assert_eq!(
        pool.state().routes().get(2).unwrap_err(),
        ProviderError::NotInitialized(2)
    );
}

#[test]
fn test_funded_invoice_cannot_be_reapproved() {
    let mut pool = funded_pool();
    let err = pool.approve("underwriter", 1, 500, 200, 8_000, 0).unwrap_err();
    assert_eq!(err, PoolError::AlreadyFunded(1));
    assert_eq!(err.kind(), ErrorKind::StaleState);
}

// ============================================================================
// Funding rejections
// ============================================================================

fn assert_fund_rejected(pool: &mut Pool, caller: &str, upfront: u32, kind: ErrorKind) -> PoolError {
    let before = pool.state().clone();
    let events = pool.event_log().len();
    let err = pool.fund(caller, 1, upfront, caller).unwrap_err();
    assert_eq!(err.kind(), kind, "{}", err);
    assert_eq!(pool.state(), &before);
    assert_eq!(pool.event_log().len(), events);
    err
}

#[test]
fn test_fund_unapproved_invoice() {
    let mut pool = pool_with_deposit(100_000);
    let err = assert_fund_rejected(&mut pool, "acme", 8_000, ErrorKind::NotFound);
    assert_eq!(err, PoolError::InvoiceNotApproved(1));
}

#[test]
fn test_fund_requires_permission_and_creditor() {
    let mut pool = approved_pool(100_000);
    let err = assert_fund_rejected(&mut pool, "mallory", 8_000, ErrorKind::Authorization);
    assert!(matches!(err, PoolError::NotPermitted { .. }));

    let err = assert_fund_rejected(&mut pool, "newco", 8_000, ErrorKind::Authorization);
    assert!(matches!(err, PoolError::Unauthorized { .. }));

    pool.factoring_permissions_mut().revoke("acme");
    assert_fund_rejected(&mut pool, "acme", 8_000, ErrorKind::Authorization);
}

#[test]
fn test_fund_after_expiry() {
    let mut pool = approved_pool(100_000);
    pool.advance_time(3_601);
    let err = assert_fund_rejected(&mut pool, "acme", 8_000, ErrorKind::Temporal);
    assert_eq!(
        err,
        PoolError::ApprovalExpired {
            id: 1,
            expired_at: START + 3_600
        }
    );
}

#[test]
fn test_fund_at_expiry_boundary() {
    let mut pool = approved_pool(100_000);
    pool.advance_time(3_600);
    assert!(pool.fund("acme", 1, 8_000, "acme").is_ok());
}

#[test]
fn test_fund_rejects_stale_paid_amount() {
    let mut pool = approved_pool(100_000);
    pool.provider_mut().pay(1, 100).unwrap();
    let err = assert_fund_rejected(&mut pool, "acme", 8_000, ErrorKind::StaleState);
    assert_eq!(
        err,
        PoolError::PaidAmountChanged {
            id: 1,
            approved: 0,
            current: 100
        }
    );
}

#[test]
fn test_fund_rejects_changed_creditor() {
    let mut pool = approved_pool(100_000);
    pool.provider_mut().transfer(1, "newco").unwrap();
    let err = assert_fund_rejected(&mut pool, "newco", 8_000, ErrorKind::StaleState);
    assert!(matches!(err, PoolError::CreditorChanged { .. }));
}

#[test]
fn test_fund_rejects_canceled_invoice() {
    let mut pool = approved_pool(100_000);
    pool.provider_mut().cancel(1).unwrap();
    let err = assert_fund_rejected(&mut pool, "acme", 8_000, ErrorKind::StaleState);
    assert_eq!(err, PoolError::InvoiceCanceled(1));
}

#[test]
fn test_fund_upfront_bounds() {
    let mut pool = approved_pool(100_000);
    let err = assert_fund_rejected(&mut pool, "acme", 8_001, ErrorKind::InvariantViolation);
    assert_eq!(
        err,
        PoolError::UpfrontExceedsApproved {
            requested: 8_001,
            approved: 8_000
        }
    );
    assert_fund_rejected(&mut pool, "acme", 0, ErrorKind::InvariantViolation);
}

#[test]
fn test_fund_insufficient_liquidity() {
    let mut pool = approved_pool(8_024);
    let err = assert_fund_rejected(&mut pool, "acme", 8_000, ErrorKind::Capacity);
    assert_eq!(
        err,
        PoolError::InsufficientLiquidity {
            required: 8_025,
            available: 8_024
        }
    );

    // Exactly enough is enough
    pool.deposit("bob", "bob", 1).unwrap();
    assert!(pool.fund("acme", 1, 8_000, "acme").is_ok());
    assert_eq!(pool.available_liquidity(), 0);
}

#[test]
fn test_fund_twice() {
    let mut pool = funded_pool();
    let err = assert_fund_rejected(&mut pool, "acme", 8_000, ErrorKind::StaleState);
    assert_eq!(err, PoolError::AlreadyFunded(1));
}

// ============================================================================
// Unfactor
// ============================================================================

#[test]
fn test_unfactor_without_payments_is_a_claim() {
    let mut pool = funded_pool();
    pool.advance_days(10);
    let outcome = pool.unfactor("acme", 1).unwrap();

    assert_eq!(outcome.owed, 7_939 + 25 + 20);
    assert_eq!(outcome.payments, 0);
    assert_eq!(outcome.settlement, 7_984);
    assert!(pool.position(1).is_none());
    assert_eq!(pool.state().tracker().total_daily_rate(), 0);
    assert_eq!(pool.state().capital().realized_interest, 13);
    assert_consistent(&pool);
}

#[test]
fn test_unfactor_after_partial_payment_is_a_refund() {
    let mut pool = funded_pool();
    pool.advance_days(10);
    pool.provider_mut().pay(1, 9_000).unwrap();
    let outcome = pool.unfactor("owner", 1).unwrap();

    assert_eq!(outcome.payments, 9_000);
    assert_eq!(outcome.settlement, -1_016);
    assert_consistent(&pool);
    assert!(matches!(
        pool.event_log().events_of_type("InvoiceUnfactored")[0],
        Event::InvoiceUnfactored { settlement: -1_016, .. }
    ));
}

#[test]
fn test_unfactor_rejections() {
    let mut pool = funded_pool();
    let err = pool.unfactor("mallory", 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);

    let mut pool = approved_pool(100_000);
    assert_eq!(pool.unfactor("acme", 1), Err(PoolError::NotFunded(1)));
}

// ============================================================================
// Impairment
// ============================================================================

#[test]
fn test_impairment_and_recovery() {
    let mut pool = funded_pool();

    pool.advance_days(34);
    let err = pool.impair("underwriter", 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Temporal);
    assert!(pool.impair("acme", 1).is_err());

    pool.advance_days(1);
    assert_eq!(pool.impaired_candidates().unwrap(), vec![1]);
    let loss = pool.impair("underwriter", 1).unwrap();
    assert_eq!(loss, 7_939 + 25);
    assert_eq!(pool.position(1).unwrap().status, PositionStatus::Impaired);
    assert_eq!(pool.state().ledger().capital_at_risk(), 0);
    assert_eq!(pool.state().tracker().total_daily_rate(), 0);
    assert_eq!(pool.total_assets(), 100_000 - 7_964);
    assert_consistent(&pool);

    // Impairing twice is rejected
    assert_eq!(pool.impair("owner", 1), Err(PoolError::NotFunded(1)));

    // The debtor pays late: principal is recovered and fees settle as usual
    pool.advance_days(5);
    pool.provider_mut().pay_in_full(1).unwrap();
    assert_eq!(pool.paid_positions().unwrap(), vec![1]);
    let fees = pool.reconcile(1).unwrap();

    let capital = pool.state().capital();
    assert_eq!(capital.realized_losses, 7_964);
    assert_eq!(capital.recoveries, 7_964);
    assert_eq!(capital.realized_interest, fees.interest);
    assert!(pool.position(1).is_none());
    assert!(matches!(
        pool.event_log().events_of_type("InvoiceReconciled")[0],
        Event::InvoiceReconciled { recovered: true, .. }
    ));
    assert_consistent(&pool);
}

#[test]
fn test_short_payment_books_a_loss() {
    let mut pool = funded_pool();
    pool.advance_days(10);
    {
        let details = pool.provider_mut().details_mut(1).unwrap();
        details.paid_amount = 5_000;
        details.is_paid = true;
    }
    let fees = pool.reconcile(1).unwrap();
    assert_eq!(fees.total_fees() + fees.kickback, 0);
    assert_eq!(pool.state().capital().realized_losses, 7_964 - 5_000);
    assert_consistent(&pool);
}

// ============================================================================
// Keeper sweep
// ============================================================================

#[test]
fn test_keeper_sweep() {
    let mut pool = funded_pool();
    pool.approve("underwriter", 2, 600, 100, 7_000, 0).unwrap();
    pool.fund("acme", 2, 7_000, "acme").unwrap();

    pool.advance_days(15);
    pool.provider_mut().pay_in_full(1).unwrap();
    assert_eq!(pool.paid_positions().unwrap(), vec![1]);

    let sweep = pool.reconcile_paid_positions().unwrap();
    assert_eq!(sweep.settled.len(), 1);
    assert_eq!(sweep.settled[0].0, 1);
    assert!(sweep.failed.is_empty());
    assert!(pool.paid_positions().unwrap().is_empty());
    assert!(pool.impaired_candidates().unwrap().is_empty());

    pool.advance_days(20);
    assert_eq!(pool.impaired_candidates().unwrap(), vec![2]);
    assert_consistent(&pool);
}

/// Registry whose reads of one invoice fail once a read budget runs out
struct FlakyProvider {
    inner: InMemoryInvoiceProvider,
    flaky_id: InvoiceId,
    reads_left: Cell<Option<usize>>,
}

impl InvoiceProvider for FlakyProvider {
    fn invoice_details(&self, id: InvoiceId) -> Result<InvoiceDetails, ProviderError> {
        if id == self.flaky_id {
            match self.reads_left.get() {
                Some(0) => return Err(ProviderError::UnknownInvoice(id)),
                Some(n) => self.reads_left.set(Some(n - 1)),
                None => {}
            }
        }
        self.inner.invoice_details(id)
    }

    fn contract_address(&self, id: InvoiceId) -> Result<String, ProviderError> {
        self.inner.contract_address(id)
    }

    fn initialize(&mut self, id: InvoiceId) -> Result<(), ProviderError> {
        self.inner.initialize(id)
    }
}

#[test]
fn test_keeper_sweep_reports_failures_and_keeps_settled() {
    let config = PoolConfig::new("USDC", "owner", "underwriter", "treasury")
        .with_admin_fee_bps(50)
        .with_protocol_fee_bps(25);
    let mut inner = InMemoryInvoiceProvider::new("0xinvoices");
    inner.insert(1, invoice(10_000));
    inner.insert(2, invoice(20_000));
    let provider = FlakyProvider {
        inner,
        flaky_id: 1,
        reads_left: Cell::new(None),
    };
    let mut pool = FactoringPool::new(
        config,
        START,
        provider,
        AllowList::new(["alice"]),
        AllowList::new(["acme"]),
    )
    .unwrap();
    pool.deposit("alice", "alice", 100_000).unwrap();
    pool.approve("underwriter", 1, 500, 200, 8_000, 0).unwrap();
    pool.fund("acme", 1, 8_000, "acme").unwrap();
    pool.approve("underwriter", 2, 600, 100, 7_000, 0).unwrap();
    pool.fund("acme", 2, 7_000, "acme").unwrap();

    pool.advance_days(15);
    pool.provider_mut().inner.pay_in_full(1).unwrap();
    pool.provider_mut().inner.pay_in_full(2).unwrap();

    // Invoice 1 is readable while the sweep lists paid positions, then fails
    pool.provider_mut().reads_left.set(Some(1));
    let sweep = pool.reconcile_paid_positions().unwrap();
    assert_eq!(sweep.settled.len(), 1);
    assert_eq!(sweep.settled[0].0, 2);
    assert_eq!(
        sweep.failed,
        vec![(1, PoolError::Provider(ProviderError::UnknownInvoice(1)))]
    );
    assert_eq!(pool.position(1).unwrap().status, PositionStatus::Funded);
    assert!(pool.position(2).is_none());
    assert!(pool.state().check_invariants().is_ok());

    // Once the registry recovers the next sweep picks up the rest
    pool.provider_mut().reads_left.set(None);
    let sweep = pool.reconcile_paid_positions().unwrap();
    assert_eq!(sweep.settled.len(), 1);
    assert_eq!(sweep.settled[0].0, 1);
    assert!(sweep.failed.is_empty());
    assert!(pool.state().positions().is_empty());
}
