//! Pool configuration
//!
//! Identities and rates fixed at pool creation. The owner can later change
//! the fee rates, the underwriter and the approval window through
//! [`crate::pool::FactoringPool`] setters; fee terms already snapshotted into
//! an approval are not affected.
//!
//! # Example
//!
//! ```rust
//! use factoring_pool_core_rs::pool::PoolConfig;
//!
//! let config = PoolConfig::from_json_str(r#"{
//!     "asset": "USDC",
//!     "owner": "owner",
//!     "underwriter": "underwriter",
//!     "protocol_fee_receiver": "treasury",
//!     "admin_fee_bps": 50,
//!     "protocol_fee_bps": 25
//! }"#).unwrap();
//!
//! assert_eq!(config.approval_duration_secs, 3_600);
//! assert_eq!(config.max_queue_length, 10_000);
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fees::BPS_DENOMINATOR;

/// Default lifetime of an approval
pub const DEFAULT_APPROVAL_DURATION_SECS: u64 = 3_600;

/// Default limit on live redemption queue entries
pub const DEFAULT_MAX_QUEUE_LENGTH: usize = 10_000;

/// Configuration validation errors
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("{name} = {value} bps exceeds 10000")]
    InvalidBps { name: &'static str, value: u32 },

    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    #[error("approval_duration_secs must be > 0")]
    ZeroApprovalDuration,

    #[error("max_queue_length must be > 0")]
    ZeroQueueLength,
}

fn default_approval_duration() -> u64 {
    DEFAULT_APPROVAL_DURATION_SECS
}

fn default_max_queue_length() -> usize {
    DEFAULT_MAX_QUEUE_LENGTH
}

/// Complete pool configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Asset (token) the pool accepts and pays out
    pub asset: String,

    /// Pool owner: parameter changes, admin fee withdrawal, queue compaction
    pub owner: String,

    /// Sole identity allowed to approve invoices
    pub underwriter: String,

    /// Recipient of protocol fees
    pub protocol_fee_receiver: String,

    /// Annual admin fee rate, bps
    pub admin_fee_bps: u32,

    /// Protocol fee on face value, bps (charged once at funding)
    pub protocol_fee_bps: u32,

    /// Seconds an approval stays fundable
    #[serde(default = "default_approval_duration")]
    pub approval_duration_secs: u64,

    /// Maximum number of live redemption queue entries
    #[serde(default = "default_max_queue_length")]
    pub max_queue_length: usize,
}

impl PoolConfig {
    /// Create a config with default approval window and queue limit
    pub fn new(asset: &str, owner: &str, underwriter: &str, protocol_fee_receiver: &str) -> Self {
        Self {
            asset: asset.to_string(),
            owner: owner.to_string(),
            underwriter: underwriter.to_string(),
            protocol_fee_receiver: protocol_fee_receiver.to_string(),
            admin_fee_bps: 0,
            protocol_fee_bps: 0,
            approval_duration_secs: DEFAULT_APPROVAL_DURATION_SECS,
            max_queue_length: DEFAULT_MAX_QUEUE_LENGTH,
        }
    }

    pub fn with_admin_fee_bps(mut self, bps: u32) -> Self {
        self.admin_fee_bps = bps;
        self
    }

    pub fn with_protocol_fee_bps(mut self, bps: u32) -> Self {
        self.protocol_fee_bps = bps;
        self
    }

    pub fn with_approval_duration(mut self, seconds: u64) -> Self {
        self.approval_duration_secs = seconds;
        self
    }

    pub fn with_max_queue_length(mut self, max_length: usize) -> Self {
        self.max_queue_length = max_length;
        self
    }

    /// Parse and validate a JSON config
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: PoolConfig =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check ranges and required fields
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("asset", &self.asset),
            ("owner", &self.owner),
            ("underwriter", &self.underwriter),
            ("protocol_fee_receiver", &self.protocol_fee_receiver),
        ] {
            if value.is_empty() {
                return Err(ConfigError::EmptyField(name));
            }
        }

        for (name, value) in [
            ("admin_fee_bps", self.admin_fee_bps),
            ("protocol_fee_bps", self.protocol_fee_bps),
        ] {
            if value > BPS_DENOMINATOR {
                return Err(ConfigError::InvalidBps { name, value });
            }
        }

        if self.approval_duration_secs == 0 {
            return Err(ConfigError::ZeroApprovalDuration);
        }
        if self.max_queue_length == 0 {
            return Err(ConfigError::ZeroQueueLength);
        }
        Ok(())
    }
}
