//! Event logging for audit and replay.
//!
//! Every state change in the pool appends one [`Event`]. The log is the
//! pool's audit trail:
//! - Auditing (verify how each invoice was funded and settled)
//! - Debugging (what happened, and when)
//! - Analysis (fee income, queue waiting times)
//!
//! # Event Types
//!
//! - **Position**: approval, funding, reconcile, unfactor, impairment
//! - **Capital**: deposits, served redemptions
//! - **Queue**: queued, cancelled, compacted
//! - **Admin**: fee withdrawals, parameter changes
//!
//! # Example
//!
//! ```rust
//! use factoring_pool_core_rs::models::event::{Event, EventLog};
//!
//! let mut log = EventLog::new();
//! log.log(Event::Deposit {
//!     timestamp: 1_700_000_000,
//!     depositor: "alice".to_string(),
//!     receiver: "alice".to_string(),
//!     assets: 100_000,
//!     shares: 100_000,
//! });
//!
//! assert_eq!(log.events_of_type("Deposit").len(), 1);
//! assert_eq!(log.events_for_account("alice").len(), 1);
//! ```

use serde::{Deserialize, Serialize};

use crate::models::redemption_queue::RedemptionRequest;
use crate::providers::InvoiceId;

/// Pool event capturing a state change.
///
/// All events carry the timestamp at which they happened. Events are logged
/// in the order they occur.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// Underwriter approved an invoice for funding
    InvoiceApproved {
        timestamp: u64,
        invoice_id: InvoiceId,
        target_yield_bps: u32,
        spread_bps: u32,
        upfront_bps: u32,
        initial_face_value: i64,
    },

    /// Pool advanced funds against an approved invoice
    InvoiceFunded {
        timestamp: u64,
        invoice_id: InvoiceId,
        receiver: String,
        upfront_bps: u32,
        gross: i64,
        net: i64,
        protocol_fee: i64,
    },

    /// Paid invoice settled through the fee waterfall
    InvoiceReconciled {
        timestamp: u64,
        invoice_id: InvoiceId,
        interest: i64,
        spread: i64,
        admin_fee: i64,
        kickback: i64,
        /// Settled after having been impaired
        recovered: bool,
    },

    /// Kickback transferred to the original creditor
    KickbackPaid {
        timestamp: u64,
        invoice_id: InvoiceId,
        receiver: String,
        amount: i64,
    },

    /// Position closed early by its creditor
    InvoiceUnfactored {
        timestamp: u64,
        invoice_id: InvoiceId,
        caller: String,
        interest: i64,
        spread: i64,
        admin_fee: i64,
        /// Positive: creditor paid the pool. Negative: pool refunded the creditor.
        settlement: i64,
    },

    /// Position written down after its impairment date
    InvoiceImpaired {
        timestamp: u64,
        invoice_id: InvoiceId,
        loss: i64,
    },

    Deposit {
        timestamp: u64,
        depositor: String,
        receiver: String,
        assets: i64,
        shares: i64,
    },

    /// Redemption paid out (immediately or from the queue)
    RedemptionServed {
        timestamp: u64,
        owner: String,
        receiver: String,
        assets: i64,
        shares: i64,
        queue_index: Option<usize>,
    },

    RedemptionQueued {
        timestamp: u64,
        owner: String,
        receiver: String,
        index: usize,
        request: RedemptionRequest,
    },

    RedemptionCancelled {
        timestamp: u64,
        owner: String,
        index: usize,
        request: RedemptionRequest,
    },

    QueueCompacted {
        timestamp: u64,
        reclaimed: usize,
    },

    FeesWithdrawn {
        timestamp: u64,
        recipient: String,
        admin_fees: i64,
        spread_gains: i64,
        protocol_fees: i64,
    },

    ParameterChanged {
        timestamp: u64,
        name: String,
        old_value: String,
        new_value: String,
    },
}

impl Event {
    /// Timestamp when this event occurred
    pub fn timestamp(&self) -> u64 {
        match self {
            Event::InvoiceApproved { timestamp, .. }
            | Event::InvoiceFunded { timestamp, .. }
            | Event::InvoiceReconciled { timestamp, .. }
            | Event::KickbackPaid { timestamp, .. }
            | Event::InvoiceUnfactored { timestamp, .. }
            | Event::InvoiceImpaired { timestamp, .. }
            | Event::Deposit { timestamp, .. }
            | Event::RedemptionServed { timestamp, .. }
            | Event::RedemptionQueued { timestamp, .. }
            | Event::RedemptionCancelled { timestamp, .. }
            | Event::QueueCompacted { timestamp, .. }
            | Event::FeesWithdrawn { timestamp, .. }
            | Event::ParameterChanged { timestamp, .. } => *timestamp,
        }
    }

    /// Short name of the event type
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::InvoiceApproved { .. } => "InvoiceApproved",
            Event::InvoiceFunded { .. } => "InvoiceFunded",
            Event::InvoiceReconciled { .. } => "InvoiceReconciled",
            Event::KickbackPaid { .. } => "KickbackPaid",
            Event::InvoiceUnfactored { .. } => "InvoiceUnfactored",
            Event::InvoiceImpaired { .. } => "InvoiceImpaired",
            Event::Deposit { .. } => "Deposit",
            Event::RedemptionServed { .. } => "RedemptionServed",
            Event::RedemptionQueued { .. } => "RedemptionQueued",
            Event::RedemptionCancelled { .. } => "RedemptionCancelled",
            Event::QueueCompacted { .. } => "QueueCompacted",
            Event::FeesWithdrawn { .. } => "FeesWithdrawn",
            Event::ParameterChanged { .. } => "ParameterChanged",
        }
    }

    /// Invoice ID if the event relates to a specific invoice
    pub fn invoice_id(&self) -> Option<InvoiceId> {
        match self {
            Event::InvoiceApproved { invoice_id, .. }
            | Event::InvoiceFunded { invoice_id, .. }
            | Event::InvoiceReconciled { invoice_id, .. }
            | Event::KickbackPaid { invoice_id, .. }
            | Event::InvoiceUnfactored { invoice_id, .. }
            | Event::InvoiceImpaired { invoice_id, .. } => Some(*invoice_id),
            _ => None,
        }
    }

    /// Account the event is about, if any
    pub fn account(&self) -> Option<&str> {
        match self {
            Event::InvoiceFunded { receiver, .. } => Some(receiver),
            Event::KickbackPaid { receiver, .. } => Some(receiver),
            Event::InvoiceUnfactored { caller, .. } => Some(caller),
            Event::Deposit { receiver, .. } => Some(receiver),
            Event::RedemptionServed { owner, .. } => Some(owner),
            Event::RedemptionQueued { owner, .. } => Some(owner),
            Event::RedemptionCancelled { owner, .. } => Some(owner),
            Event::FeesWithdrawn { recipient, .. } => Some(recipient),
            _ => None,
        }
    }
}

/// Event log for storing and querying pool events.
///
/// This is a simple wrapper around Vec<Event> with convenience methods.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    /// Create a new empty event log
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Add an event to the log
    pub fn log(&mut self, event: Event) {
        self.events.push(event);
    }

    /// Get the number of events logged
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check if the log is empty
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Get all events
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Get events logged at a specific timestamp
    pub fn events_at(&self, timestamp: u64) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.timestamp() == timestamp)
            .collect()
    }

    /// Get events of a specific type
    pub fn events_of_type(&self, event_type: &str) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    /// Get events for a specific invoice
    pub fn events_for_invoice(&self, invoice_id: InvoiceId) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.invoice_id() == Some(invoice_id))
            .collect()
    }

    /// Get events for a specific account
    pub fn events_for_account(&self, account: &str) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.account() == Some(account))
            .collect()
    }

    /// Clear all events
    pub fn clear(&mut self) {
        self.events.clear();
    }
}
