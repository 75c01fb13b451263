//! Tunable parameters of the sync engine.
//!
//! Every field has a default, so hosts may supply partial JSON:
//! ```json
//! { "policy": { "clock_skew_tolerance_ms": 120000 } }
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SyncResult;

/// Engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Per-operation time budgets
    #[serde(default)]
    pub timeouts: Timeouts,
    /// Thresholds deciding when replicas need manual resolution
    #[serde(default)]
    pub policy: DivergencePolicy,
}

impl SyncConfig {
    /// Parse a (possibly partial) JSON configuration.
    pub fn from_json(input_json: &str) -> SyncResult<Self> {
        Ok(serde_json::from_str(input_json)?)
    }
}

/// Time budgets for remote operations, in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeouts {
    #[serde(default = "default_ping_ms")]
    pub ping_ms: u64,
    #[serde(default = "default_exists_ms")]
    pub exists_ms: u64,
    #[serde(default = "default_transfer_ms")]
    pub read_ms: u64,
    #[serde(default = "default_transfer_ms")]
    pub write_ms: u64,
}

impl Timeouts {
    pub fn ping(&self) -> Duration {
        Duration::from_millis(self.ping_ms)
    }

    pub fn exists(&self) -> Duration {
        Duration::from_millis(self.exists_ms)
    }

    pub fn read(&self) -> Duration {
        Duration::from_millis(self.read_ms)
    }

    pub fn write(&self) -> Duration {
        Duration::from_millis(self.write_ms)
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            ping_ms: default_ping_ms(),
            exists_ms: default_exists_ms(),
            read_ms: default_transfer_ms(),
            write_ms: default_transfer_ms(),
        }
    }
}

/// Divergence thresholds used by conflict detection.
///
/// All comparisons are strict: a gap equal to the threshold is not divergence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DivergencePolicy {
    /// `last_updated` gap under which differing versions of a mutable item
    /// are treated as the same version
    #[serde(default = "default_clock_skew_tolerance_ms")]
    pub clock_skew_tolerance_ms: i64,
    #[serde(default = "default_max_level_gap")]
    pub max_level_gap: u32,
    #[serde(default = "default_max_xp_gap")]
    pub max_xp_gap: u64,
}

impl Default for DivergencePolicy {
    fn default() -> Self {
        Self {
            clock_skew_tolerance_ms: default_clock_skew_tolerance_ms(),
            max_level_gap: default_max_level_gap(),
            max_xp_gap: default_max_xp_gap(),
        }
    }
}

fn default_ping_ms() -> u64 {
    3_000
}

fn default_exists_ms() -> u64 {
    5_000
}

fn default_transfer_ms() -> u64 {
    10_000
}

fn default_clock_skew_tolerance_ms() -> i64 {
    60_000
}

fn default_max_level_gap() -> u32 {
    1
}

fn default_max_xp_gap() -> u64 {
    500
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.timeouts.ping(), Duration::from_secs(3));
        assert_eq!(config.timeouts.exists(), Duration::from_secs(5));
        assert_eq!(config.timeouts.read(), Duration::from_secs(10));
        assert_eq!(config.timeouts.write(), Duration::from_secs(10));
        assert_eq!(config.policy.clock_skew_tolerance_ms, 60_000);
        assert_eq!(config.policy.max_level_gap, 1);
        assert_eq!(config.policy.max_xp_gap, 500);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config =
            SyncConfig::from_json(r#"{"policy": {"max_xp_gap": 1000}, "timeouts": {"ping_ms": 500}}"#)
                .unwrap();
        assert_eq!(config.policy.max_xp_gap, 1000);
        assert_eq!(config.policy.max_level_gap, 1);
        assert_eq!(config.timeouts.ping_ms, 500);
        assert_eq!(config.timeouts.write_ms, 10_000);
    }

    #[test]
    fn test_invalid_json() {
        assert!(SyncConfig::from_json("{not json").is_err());
    }
}
