//! Factoring Pool Core - Rust Engine
//!
//! Accounting core of an invoice factoring pool: depositors pool capital, the
//! pool advances funds against approved invoices, and settles fees and
//! kickbacks once the invoices are paid.
//!
//! # Architecture
//!
//! - **core**: Time management
//! - **fees**: Fee terms and the stateless fee waterfall calculator
//! - **models**: Accrual tracker, capital ledger, redemption queue, positions, state
//! - **providers**: Invoice source and permission collaborators
//! - **settlement**: Redemption service loop (immediate service + FIFO queue)
//! - **pool**: `FactoringPool` facade, configuration, checkpointing, errors
//!
//! # Critical Invariants
//!
//! 1. All money values are i64 (smallest asset unit)
//! 2. Every operation is all-or-nothing
//! 3. Aggregates always equal the sums over the live position set

// Module declarations
pub mod core;
pub mod fees;
pub mod models;
pub mod pool;
pub mod providers;
pub mod settlement;

// Re-exports for convenience
pub use core::time::Clock;
pub use fees::{calculate_fees, quote_funding, FeeBreakdown, FeeError, FeeSnapshot, FeeTerms};
pub use models::{
    accrual::AccrualTracker,
    capital::CapitalLedger,
    event::{Event, EventLog},
    position::{Position, PositionStatus},
    redemption_queue::{RedemptionQueue, RedemptionRequest},
    state::PoolState,
};
pub use pool::{ErrorKind, FactoringPool, PoolConfig, PoolError};
pub use providers::{InvoiceDetails, InvoiceId, InvoiceProvider, Permissions};
pub use settlement::{QueueProcessingResult, RedemptionOutcome};
