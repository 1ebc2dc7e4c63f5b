//! Factoring pool facade
//!
//! [`FactoringPool`] exposes every operation of the accounting core on top
//! of an explicit [`crate::models::state::PoolState`].
//!
//! See `engine.rs` for the operations and `checkpoint.rs` for persistence.

pub mod checkpoint;
pub mod config;
pub mod engine;
pub mod error;

pub use checkpoint::{compute_config_hash, PoolSnapshot};
pub use config::{ConfigError, PoolConfig, DEFAULT_APPROVAL_DURATION_SECS, DEFAULT_MAX_QUEUE_LENGTH};
pub use engine::{FactoringPool, SweepResult, UnfactorOutcome};
pub use error::{ErrorKind, PoolError};
