//! External Collaborators
//!
//! The accounting core does not own invoices or identities. It consumes two
//! collaborators through traits:
//!
//! - [`InvoiceProvider`]: reports face value, due date, paid amount,
//!   creditor and status of an invoice, and resolves its routing metadata
//! - [`Permissions`]: allow-list queried before deposits, withdrawals and
//!   factoring actions
//!
//! In-memory implementations live in [`memory`] for tests and embedding.

pub mod memory;
pub mod routing;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use memory::{AllowAll, AllowList, InMemoryInvoiceProvider};
pub use routing::{Route, RoutingCache};

/// Invoice identifier assigned by the provider
pub type InvoiceId = u64;

/// Errors reported by collaborators
#[derive(Debug, Error, PartialEq)]
pub enum ProviderError {
    #[error("Unknown invoice: {0}")]
    UnknownInvoice(InvoiceId),

    #[error("Routing for invoice {0} not initialized")]
    NotInitialized(InvoiceId),
}

/// Invoice data as reported by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceDetails {
    pub face_value: i64,
    pub due_date: u64,
    pub paid_amount: i64,
    pub creditor: String,
    pub debtor: String,
    /// Currency the invoice is denominated in
    pub token: String,
    pub is_canceled: bool,
    pub is_paid: bool,
    /// Seconds after the due date before the invoice counts as impaired
    pub impairment_grace_period: u64,
}

impl InvoiceDetails {
    /// Create an unpaid, active invoice
    ///
    /// # Example
    /// ```
    /// use factoring_pool_core_rs::providers::InvoiceDetails;
    ///
    /// let invoice = InvoiceDetails::new(10_000, 1_000_000, "creditor", "debtor", "USDC")
    ///     .with_grace_period(86_400);
    /// assert_eq!(invoice.outstanding(), 10_000);
    /// ```
    pub fn new(face_value: i64, due_date: u64, creditor: &str, debtor: &str, token: &str) -> Self {
        Self {
            face_value,
            due_date,
            paid_amount: 0,
            creditor: creditor.to_string(),
            debtor: debtor.to_string(),
            token: token.to_string(),
            is_canceled: false,
            is_paid: false,
            impairment_grace_period: 0,
        }
    }

    pub fn with_grace_period(mut self, seconds: u64) -> Self {
        self.impairment_grace_period = seconds;
        self
    }

    pub fn with_paid_amount(mut self, paid_amount: i64) -> Self {
        self.paid_amount = paid_amount;
        self.is_paid = paid_amount >= self.face_value;
        self
    }

    /// Face value not yet paid
    pub fn outstanding(&self) -> i64 {
        (self.face_value - self.paid_amount).max(0)
    }

    /// Paid in full (either flagged by the provider or by amount)
    pub fn is_fully_paid(&self) -> bool {
        self.is_paid || self.paid_amount >= self.face_value
    }
}

/// Source of invoice data
pub trait InvoiceProvider {
    /// Current state of invoice `id`
    fn invoice_details(&self, id: InvoiceId) -> Result<InvoiceDetails, ProviderError>;

    /// Contract holding invoice `id`; fails before [`InvoiceProvider::initialize`]
    fn contract_address(&self, id: InvoiceId) -> Result<String, ProviderError>;

    /// One-time setup of routing metadata for invoice `id`
    fn initialize(&mut self, id: InvoiceId) -> Result<(), ProviderError>;
}

/// Allow-list check for an identity
pub trait Permissions {
    fn is_allowed(&self, identity: &str) -> bool;
}
