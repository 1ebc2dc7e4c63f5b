//! Checkpoint - Save/Load Pool State
//!
//! Serializes the complete accounting state to JSON so a pool can be
//! persisted and resumed.
//!
//! # Critical Invariants
//!
//! - **Config Matching**: state can only be loaded with the config it was saved under
//! - **Ledger Identity**: aggregates are re-verified against restored positions
//! - **Queue Integrity**: head cursor and one-live-entry-per-owner are re-checked

use log::info;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::core::time::Clock;
use crate::models::state::PoolState;
use crate::pool::config::PoolConfig;
use crate::pool::engine::FactoringPool;
use crate::pool::error::PoolError;
use crate::models::event::EventLog;
use crate::providers::{InvoiceProvider, Permissions};

// ============================================================================
// Snapshot Structure
// ============================================================================

/// Complete pool state snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    /// Pool time at the moment of the snapshot
    pub clock: Clock,

    /// Positions, aggregates, shares, queue, fee balances and routes
    pub state: PoolState,

    /// SHA256 hash of the config (for validation)
    pub config_hash: String,
}

// ============================================================================
// Config Hashing
// ============================================================================

/// Compute deterministic SHA256 hash of config
///
/// Uses canonical JSON serialization with sorted keys so the hash does not
/// depend on field order.
pub fn compute_config_hash<T: Serialize>(config: &T) -> Result<String, PoolError> {
    use serde_json::Value;
    use std::collections::BTreeMap;

    let value = serde_json::to_value(config)
        .map_err(|e| PoolError::Checkpoint(format!("Config serialization failed: {}", e)))?;

    fn canonicalize(value: Value) -> Value {
        match value {
            Value::Object(map) => {
                let sorted: BTreeMap<String, Value> =
                    map.into_iter().map(|(k, v)| (k, canonicalize(v))).collect();
                Value::Object(sorted.into_iter().collect())
            }
            Value::Array(arr) => Value::Array(arr.into_iter().map(canonicalize).collect()),
            other => other,
        }
    }

    let json = serde_json::to_string(&canonicalize(value))
        .map_err(|e| PoolError::Checkpoint(format!("Config serialization failed: {}", e)))?;

    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

// ============================================================================
// Save / Load
// ============================================================================

impl<P: InvoiceProvider, A: Permissions> FactoringPool<P, A> {
    /// Serialize the pool state to JSON
    ///
    /// The event log is not part of the snapshot.
    pub fn save_state(&self) -> Result<String, PoolError> {
        let snapshot = PoolSnapshot {
            clock: self.clock,
            state: self.state.clone(),
            config_hash: compute_config_hash(&self.config)?,
        };
        serde_json::to_string(&snapshot)
            .map_err(|e| PoolError::Checkpoint(format!("Snapshot serialization failed: {}", e)))
    }

    /// Restore a pool from JSON produced by [`FactoringPool::save_state`]
    ///
    /// # Errors
    ///
    /// - `Checkpoint` if the JSON is malformed or was saved under another config
    /// - `Queue` if the restored queue is inconsistent
    /// - `State` if the aggregates disagree with the restored positions
    pub fn load_state(
        config: PoolConfig,
        json: &str,
        provider: P,
        deposit_permissions: A,
        factoring_permissions: A,
    ) -> Result<Self, PoolError> {
        config.validate()?;
        let mut snapshot: PoolSnapshot = serde_json::from_str(json)
            .map_err(|e| PoolError::Checkpoint(format!("Snapshot parse failed: {}", e)))?;

        let expected = compute_config_hash(&config)?;
        if snapshot.config_hash != expected {
            return Err(PoolError::Checkpoint(format!(
                "Config hash mismatch: snapshot {}, config {}",
                snapshot.config_hash, expected
            )));
        }

        snapshot.state.queue.restore_index()?;
        snapshot.state.check_invariants()?;

        info!(
            "pool restored at {} with {} positions",
            snapshot.clock.now(),
            snapshot.state.positions().len()
        );
        Ok(Self {
            config,
            clock: snapshot.clock,
            state: snapshot.state,
            provider,
            deposit_permissions,
            factoring_permissions,
            event_log: EventLog::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_config_hash_deterministic() {
        let config = PoolConfig::new("USDC", "owner", "underwriter", "treasury");
        let hash1 = compute_config_hash(&config).unwrap();
        let hash2 = compute_config_hash(&config.clone()).unwrap();
        assert_eq!(hash1, hash2, "Same config should produce same hash");
    }

    #[test]
    fn test_compute_config_hash_different_for_different_configs() {
        let config1 = PoolConfig::new("USDC", "owner", "underwriter", "treasury");
        let config2 = config1.clone().with_admin_fee_bps(1);

        assert_ne!(
            compute_config_hash(&config1).unwrap(),
            compute_config_hash(&config2).unwrap(),
            "Different configs should produce different hashes"
        );
    }
}
