//! Settlement Module
//!
//! Moves assets out of the pool to depositors:
//! - Immediate service when liquidity is sufficient
//! - FIFO redemption queue for requests awaiting liquidity
//! - Queue passes that serve from the head and halt on the first shortfall
//!
//! # Critical Invariants
//!
//! 1. **Atomicity**: shares are burned and assets paid together, or neither
//! 2. **Ordering**: a queued request is never overtaken by a later one
//! 3. **Solvency**: payouts never exceed liquidity not reserved by positions
//!
//! # Example
//!
//! ```rust
//! use factoring_pool_core_rs::models::event::EventLog;
//! use factoring_pool_core_rs::models::redemption_queue::RedemptionRequest;
//! use factoring_pool_core_rs::models::state::PoolState;
//! use factoring_pool_core_rs::settlement;
//!
//! let mut state = PoolState::new(0, 100);
//! let mut log = EventLog::new();
//!
//! // Nobody holds shares, so any request exceeds the maximum
//! let result = settlement::submit_redemption(
//!     &mut state,
//!     "alice",
//!     "alice",
//!     RedemptionRequest::Shares(10),
//!     0,
//!     &mut log,
//! );
//! assert!(result.is_err());
//! ```

pub mod redemption;

pub use redemption::{
    max_redeemable, process_queue, submit_redemption, QueueProcessingResult, RedemptionError,
    RedemptionOutcome,
};
