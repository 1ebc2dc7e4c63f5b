//! Domain models for the factoring pool

pub mod accrual;
pub mod capital;
pub mod event;
pub mod position;
pub mod redemption_queue;
pub mod shares;
pub mod state;

// Re-exports
pub use accrual::{AccrualError, AccrualTracker, ACCRUAL_SCALE};
pub use capital::{CapitalLedger, LedgerError};
pub use event::{Event, EventLog};
pub use position::{Position, PositionStatus};
pub use redemption_queue::{Canceller, QueueEntry, QueueError, RedemptionQueue, RedemptionRequest};
pub use shares::{Rounding, ShareError, ShareLedger};
pub use state::{CapitalAccount, FeeBalances, PoolState, StateError};
