//! Pool error taxonomy
//!
//! Every failure is a normal, recoverable outcome for the caller. Operations
//! validate before mutating, so an `Err` always means "nothing changed".
//! [`PoolError::kind`] classifies a failure for callers that only care about
//! its category.

use thiserror::Error;

use crate::fees::FeeError;
use crate::models::accrual::AccrualError;
use crate::models::capital::LedgerError;
use crate::models::redemption_queue::QueueError;
use crate::models::shares::ShareError;
use crate::models::state::StateError;
use crate::pool::config::ConfigError;
use crate::providers::{InvoiceId, ProviderError};
use crate::settlement::RedemptionError;

/// Failure category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Caller lacks the required role or permission
    Authorization,
    /// Invoice data changed between approval and funding, or position in the wrong state
    StaleState,
    /// Too early, too late, or already settled
    Temporal,
    /// Not enough liquidity or queue space
    Capacity,
    /// Out-of-range input or broken accounting invariant
    InvariantViolation,
    /// Unknown invoice, position or queue index
    NotFound,
}

/// Errors returned by [`crate::pool::FactoringPool`] operations
#[derive(Debug, Error, PartialEq)]
pub enum PoolError {
    #[error("{caller} is not authorized to {action}")]
    Unauthorized { caller: String, action: &'static str },

    #[error("{identity} is not permitted by the allow-list")]
    NotPermitted { identity: String },

    #[error("Invoice {0} has no approval")]
    InvoiceNotApproved(InvoiceId),

    #[error("Invoice {0} is already funded")]
    AlreadyFunded(InvoiceId),

    #[error("Invoice {0} is not funded")]
    NotFunded(InvoiceId),

    #[error("Invoice {0} is canceled")]
    InvoiceCanceled(InvoiceId),

    #[error("Invoice {0} is already paid")]
    AlreadyPaid(InvoiceId),

    #[error("Invoice {0} is not paid yet")]
    NotPaid(InvoiceId),

    #[error("Approval of invoice {id} expired at {expired_at}")]
    ApprovalExpired { id: InvoiceId, expired_at: u64 },

    #[error("Invoice {id} is due at {due_date}, not after {now}")]
    AlreadyDue { id: InvoiceId, due_date: u64, now: u64 },

    #[error("Invoice {id} cannot be impaired before {impairment_date}")]
    NotYetImpaired { id: InvoiceId, impairment_date: u64 },

    #[error("Paid amount of invoice {id} changed from {approved} to {current}")]
    PaidAmountChanged {
        id: InvoiceId,
        approved: i64,
        current: i64,
    },

    #[error("Creditor of invoice {id} changed from {approved} to {current}")]
    CreditorChanged {
        id: InvoiceId,
        approved: String,
        current: String,
    },

    #[error("Invoice token {invoice} does not match pool asset {pool}")]
    CurrencyMismatch { invoice: String, pool: String },

    #[error("Requested upfront {requested} bps exceeds approved {approved} bps")]
    UpfrontExceedsApproved { requested: u32, approved: u32 },

    #[error("{name} = {value} bps is out of range")]
    InvalidBps { name: &'static str, value: u32 },

    #[error("Invalid amount for {name}: {value}")]
    InvalidAmount { name: &'static str, value: i64 },

    #[error("Insufficient liquidity: required {required}, available {available}")]
    InsufficientLiquidity { required: i64, available: i64 },

    #[error("{supply} shares outstanding with no assets backing them")]
    UnbackedShares { supply: i64 },

    #[error("Fee calculation failed: {0}")]
    Fee(#[from] FeeError),

    #[error("Accrual tracker: {0}")]
    Accrual(#[from] AccrualError),

    #[error("Capital ledger: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Redemption queue: {0}")]
    Queue(#[from] QueueError),

    #[error("Share ledger: {0}")]
    Shares(#[from] ShareError),

    #[error("Invoice provider: {0}")]
    Provider(#[from] ProviderError),

    #[error("Configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    State(#[from] StateError),

    #[error("Checkpoint: {0}")]
    Checkpoint(String),
}

impl From<RedemptionError> for PoolError {
    fn from(err: RedemptionError) -> Self {
        match err {
            RedemptionError::InvalidAmount(value) => PoolError::InvalidAmount {
                name: "redemption",
                value,
            },
            RedemptionError::WorthNothing(value) => PoolError::InvalidAmount {
                name: "redemption worth zero assets",
                value,
            },
            RedemptionError::ExceedsMaximum {
                requested, maximum, ..
            } => PoolError::InvalidAmount {
                name: if maximum == 0 {
                    "redemption (no holdings)"
                } else {
                    "redemption above maximum"
                },
                value: requested,
            },
            RedemptionError::Queue(e) => PoolError::Queue(e),
            RedemptionError::Shares(e) => PoolError::Shares(e),
        }
    }
}

impl PoolError {
    /// Category of this error
    ///
    /// # Example
    /// ```
    /// use factoring_pool_core_rs::pool::{ErrorKind, PoolError};
    ///
    /// let err = PoolError::ApprovalExpired { id: 1, expired_at: 3_600 };
    /// assert_eq!(err.kind(), ErrorKind::Temporal);
    /// ```
    pub fn kind(&self) -> ErrorKind {
        match self {
            PoolError::Unauthorized { .. } | PoolError::NotPermitted { .. } => {
                ErrorKind::Authorization
            }
            PoolError::InvoiceNotApproved(_) => ErrorKind::NotFound,
            PoolError::AlreadyFunded(_)
            | PoolError::NotFunded(_)
            | PoolError::InvoiceCanceled(_)
            | PoolError::PaidAmountChanged { .. }
            | PoolError::CreditorChanged { .. } => ErrorKind::StaleState,
            PoolError::AlreadyPaid(_)
            | PoolError::NotPaid(_)
            | PoolError::ApprovalExpired { .. }
            | PoolError::AlreadyDue { .. }
            | PoolError::NotYetImpaired { .. } => ErrorKind::Temporal,
            PoolError::InsufficientLiquidity { .. } => ErrorKind::Capacity,
            PoolError::Ledger(LedgerError::InsufficientLiquidity { .. }) => ErrorKind::Capacity,
            PoolError::Queue(e) => match e {
                QueueError::QueueFull { .. } => ErrorKind::Capacity,
                QueueError::NotOwner { .. } => ErrorKind::Authorization,
                QueueError::IndexOutOfBounds { .. } => ErrorKind::NotFound,
                QueueError::AlreadyCancelled { .. } => ErrorKind::StaleState,
                _ => ErrorKind::InvariantViolation,
            },
            PoolError::Provider(ProviderError::UnknownInvoice(_)) => ErrorKind::NotFound,
            PoolError::CurrencyMismatch { .. }
            | PoolError::UpfrontExceedsApproved { .. }
            | PoolError::InvalidBps { .. }
            | PoolError::InvalidAmount { .. }
            | PoolError::UnbackedShares { .. }
            | PoolError::Fee(_)
            | PoolError::Accrual(_)
            | PoolError::Ledger(_)
            | PoolError::Shares(_)
            | PoolError::Provider(_)
            | PoolError::Config(_)
            | PoolError::State(_)
            | PoolError::Checkpoint(_) => ErrorKind::InvariantViolation,
        }
    }
}
